//! Hubble ターゲットアクセス層
//!
//! このクレートは、ホストデバッガが提供するデバッグアクセスインターフェースを定義します。
//! 型情報、メモリアクセス、レジスタアクセス、シンボル解決などを抽象化します。
//! プロセスへのアタッチやELF/DWARFの読み込みはホスト側の責務です。

pub mod access;
pub mod memory;
pub mod registers;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access::{DebugAccess, ModuleHandle, ISOLATE_SYMBOL};
pub use memory::{Memory, MemoryReadable};
pub use registers::{FrameRegisterState, PendingFrame, Register};
pub use types::{
    FieldInfo, FieldLocation, RawValue, ReferenceDecoder, ReferenceForm, TypeInfo,
    COMPRESSED_REF_PREFIX,
};

/// ターゲットアクセスの結果型
pub type Result<T> = anyhow::Result<T>;
