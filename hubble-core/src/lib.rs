//! Hubble デバッガ拡張のコア機能
//!
//! このクレートは、ホストデバッガに組み込まれるセッションを提供します。
//! モジュール登録による初期化、パス式の解決と補完、脱最適化フレームの
//! アンワインド、バックトレースのフレーム表示、表示設定のコマンドを統合します。

pub mod command;
pub mod complete;
pub mod errors;
pub mod expr_eval;
pub mod frame_filter;
pub mod parse;
pub mod session;
pub mod unwinder;

pub use command::{AddressMode, Command, Limit, Toggle};
pub use complete::StaticVarTrie;
pub use expr_eval::ExpressionResolver;
pub use frame_filter::{DecoratedFrame, FrameFilter, FrameInfo};
pub use session::{Session, SessionState};
pub use unwinder::{FrameUnwinder, UnwindInfo};

// 他のクレートから使用するために再エクスポート
pub use hubble_runtime::{Inspector, PrintConfig};
pub use hubble_target::{DebugAccess, ModuleHandle, RawValue};

/// セッション操作の結果型
pub type Result<T> = anyhow::Result<T>;
