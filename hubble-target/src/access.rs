//! デバッグアクセスインターフェース
//!
//! ホストデバッガが実装するトレイトです。このワークスペースは
//! ターゲットを変更せず、読み取りと名前解決だけを要求します。

use crate::types::{RawValue, ReferenceDecoder, TypeInfo};
use crate::Result;
use std::rc::Rc;

/// ネイティブイメージのランタイムであることを示すシンボル
pub const ISOLATE_SYMBOL: &str = "graal_create_isolate";

/// ロードされたモジュール（実行ファイル・共有ライブラリ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    /// モジュールのファイル名
    pub filename: String,
}

impl ModuleHandle {
    /// モジュールハンドルを作成する
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// デバッグアクセスインターフェース
pub trait DebugAccess {
    /// ターゲットのメモリを読み取る
    fn read_memory(&self, addr: u64, size: usize) -> Result<Vec<u8>>;

    /// 型名から型情報を取得する
    fn lookup_type(&self, name: &str) -> Option<Rc<TypeInfo>>;

    /// 圧縮参照のデコード型（例: `_z_.class`）を解決する
    fn reference_decoder(&self, decode_type: &str) -> Option<ReferenceDecoder>;

    /// シンボル名からアドレスを解決する
    fn resolve_symbol(&self, name: &str) -> Option<u64>;

    /// アドレスからシンボル名を解決する
    fn symbol_at(&self, addr: u64) -> Option<String>;

    /// 現在のフレームのスコープで名前を評価する（ローカル変数・引数・グローバル）
    fn lookup_variable(&self, name: &str) -> Option<RawValue>;

    /// 現在のフレームで可視なローカル変数と引数の名前
    ///
    /// 最適化で消えた変数は含めません。
    fn visible_variable_names(&self) -> Vec<String>;

    /// 既知の静的変数の完全修飾名
    fn static_variable_names(&self) -> Vec<String>;
}
