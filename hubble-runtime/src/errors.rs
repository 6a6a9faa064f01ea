//! 値の解釈で起こるエラー

use thiserror::Error;

/// 値の解釈エラー
///
/// どれも検出した操作の境界で縮退した結果（番兵文字列、None、汎用表示）に変換されます。
#[derive(Error, Debug)]
pub enum InspectError {
    /// 実行時型メタデータを持たない値（基本型や外部の値）
    #[error("value has no recognizable runtime type metadata")]
    Unclassifiable,
    /// 文字列・配列のデコード失敗
    #[error("decode failure: {0}")]
    DecodeFailure(String),
    /// パスのセグメント、インデックス、シンボルが見つからない
    #[error("'{0}' not found")]
    ResolutionMiss(String),
    /// 型名が解決できない
    #[error("type '{0}' not found")]
    TypeNotFound(String),
    /// フィールドが存在しない
    #[error("field '{field}' not found in '{type_name}'")]
    FieldNotFound { type_name: String, field: String },
    /// ターゲットへのアクセス失敗
    #[error(transparent)]
    Access(#[from] anyhow::Error),
}

/// 値の解釈の結果型
pub type InspectResult<T> = std::result::Result<T, InspectError>;
