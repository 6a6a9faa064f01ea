//! Hubble ランタイム値の解釈
//!
//! このクレートは、マネージドランタイムの生の値を論理的な型モデル
//! （クラス、配列、文字列、列挙型、圧縮参照）に分類し、循環参照で
//! 無限に再帰しないように表示する機能を提供します。

pub mod classified;
pub mod config;
pub mod cycle;
pub mod decode;
pub mod errors;
pub mod inspector;
pub mod type_bridge;
pub mod value_formatter;

pub use classified::{ArrayValue, ClassifiedValue, DisplayHint, PrimitiveKind};
pub use config::PrintConfig;
pub use cycle::CycleDetector;
pub use decode::{StringCoder, INVALID_CSTRING, INVALID_STRING};
pub use errors::{InspectError, InspectResult};
pub use inspector::{Inspector, LookupScope};
pub use type_bridge::{strip_compression, RuntimeTypeName, TypeBridge};
pub use value_formatter::{ChildValue, Children, ValueFormatter};

/// 値の解釈の結果型
pub type Result<T> = anyhow::Result<T>;
