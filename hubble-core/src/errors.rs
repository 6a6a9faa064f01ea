//! エラーメッセージ定数

/// 式が解決できなかった場合のメッセージ
pub fn no_expression(path: &str) -> String {
    format!("No Java debug-expression \"{}\" in current context.", path)
}

/// ランタイムのモジュールではない場合の警告
pub const WARN_NOT_RUNTIME_MODULE: &str =
    "Load the Java debug helpers only in the context of a native-image module";

/// ランタイムの型メタデータが見つからない場合の警告
pub const WARN_NO_TYPE_METADATA: &str =
    "Runtime type metadata is missing; Java value printing is disabled";
