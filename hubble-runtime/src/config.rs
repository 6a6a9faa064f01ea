//! 表示設定

/// 表示設定
///
/// 1回の表示処理の間は読み取り専用で、変更はトップレベル操作の合間にだけ行います。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintConfig {
    /// マネージド値の整形を行うか
    pub enabled: bool,
    /// コレクションの高水準表現を使うか
    pub high_level_reps: bool,
    /// アドレスを併記するか
    pub with_address: bool,
    /// 圧縮参照も絶対アドレスで表示するか
    pub absolute_address: bool,
    /// 循環参照の検出を行うか
    pub cycle_check: bool,
    /// C文字列の最大表示文字数（0でC文字列表示を無効化）
    pub cstr_limit: usize,
    /// 配列の最大表示要素数（0で要素を表示しない）
    pub array_limit: usize,
    /// 親チェーンをたどる深さの上限
    pub depth_limit: usize,
    /// 静的フィールドを表示するか
    pub static_fields: bool,
    /// 静的変数名の補完を行うか
    pub complete_static_variables: bool,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_level_reps: false,
            with_address: false,
            absolute_address: false,
            cycle_check: true,
            cstr_limit: 40,
            array_limit: 10,
            depth_limit: 1,
            static_fields: false,
            complete_static_variables: false,
        }
    }
}

impl PrintConfig {
    /// 補完・式解決用に制限を外した設定
    ///
    /// 配列と深さの制限を最大にし、循環検出を無効にします。
    pub fn unlimited(&self) -> Self {
        Self {
            array_limit: 1 << 31,
            depth_limit: 1 << 31,
            cycle_check: false,
            ..*self
        }
    }
}
