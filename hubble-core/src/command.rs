//! ユーザーコマンド
//!
//! 表示設定を変更する `svm-*` コマンドと、パス式を表示する `pp` コマンドです。
//! 設定コマンドは引数なしで現在の値を報告します。

/// オン/オフを切り替える設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// `svm-print`
    Print,
    /// `svm-use-hlrep`
    HighLevelReps,
    /// `svm-selfref-check`
    SelfrefCheck,
    /// `svm-print-static-fields`
    StaticFields,
    /// `svm-complete-static-variables`
    CompleteStaticVariables,
}

impl Toggle {
    /// コマンド名
    pub fn command_name(self) -> &'static str {
        match self {
            Toggle::Print => "svm-print",
            Toggle::HighLevelReps => "svm-use-hlrep",
            Toggle::SelfrefCheck => "svm-selfref-check",
            Toggle::StaticFields => "svm-print-static-fields",
            Toggle::CompleteStaticVariables => "svm-complete-static-variables",
        }
    }

    /// 引数が設定を有効にするか
    ///
    /// 表示系の設定は `off`/`disable` 以外で有効になり、
    /// 静的フィールドと静的変数補完は `on`/`enable` でのみ有効になります。
    pub fn enables(self, arg: &str) -> bool {
        match self {
            Toggle::StaticFields | Toggle::CompleteStaticVariables => {
                matches!(arg, "on" | "enable")
            }
            _ => !matches!(arg, "off" | "disable"),
        }
    }
}

/// 数値の制限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// `svm-print-cstr-limit`
    CString,
    /// `svm-print-array-limit`
    Array,
    /// `svm-print-depth-limit`
    Depth,
}

impl Limit {
    /// コマンド名
    pub fn command_name(self) -> &'static str {
        match self {
            Limit::CString => "svm-print-cstr-limit",
            Limit::Array => "svm-print-array-limit",
            Limit::Depth => "svm-print-depth-limit",
        }
    }
}

/// アドレス表示の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// 表示しない
    Disabled,
    /// 圧縮参照は `@z(..)`、それ以外は `@(0x..)`
    Normal,
    /// すべて `@(0x..)`
    Absolute,
}

impl AddressMode {
    fn from_arg(arg: &str) -> Self {
        match arg {
            "off" | "disable" => AddressMode::Disabled,
            "absolute" => AddressMode::Absolute,
            _ => AddressMode::Normal,
        }
    }
}

/// `svm-print-address` のコマンド名
pub const PRINT_ADDRESS: &str = "svm-print-address";

/// `pp` のコマンド名
pub const PRETTY_PRINT: &str = "pp";

const TOGGLES: [Toggle; 5] = [
    Toggle::Print,
    Toggle::HighLevelReps,
    Toggle::SelfrefCheck,
    Toggle::StaticFields,
    Toggle::CompleteStaticVariables,
];

const LIMITS: [Limit; 3] = [Limit::CString, Limit::Array, Limit::Depth];

/// ユーザーコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 切り替え設定（None なら現在の値を報告）
    Toggle(Toggle, Option<bool>),
    /// アドレス表示の設定（None なら現在の値を報告）
    PrintAddress(Option<AddressMode>),
    /// 数値の制限（None なら現在の値を報告）
    Limit(Limit, Option<usize>),
    /// パス式の表示
    PrettyPrint(String),
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }
        let arg = (parts.len() > 1).then(|| parts[1..].join(" "));

        if parts[0] == PRETTY_PRINT {
            return arg.map(Command::PrettyPrint);
        }
        if parts[0] == PRINT_ADDRESS {
            return Some(Command::PrintAddress(
                arg.as_deref().map(AddressMode::from_arg),
            ));
        }
        if let Some(toggle) = TOGGLES.iter().find(|t| t.command_name() == parts[0]) {
            return Some(Command::Toggle(
                *toggle,
                arg.as_deref().map(|arg| toggle.enables(arg)),
            ));
        }
        if let Some(limit) = LIMITS.iter().find(|l| l.command_name() == parts[0]) {
            return match arg {
                Some(arg) => arg.parse().ok().map(|n| Command::Limit(*limit, Some(n))),
                None => Some(Command::Limit(*limit, None)),
            };
        }
        None
    }

    /// コマンドが受け付けるキーワード
    pub fn keywords(command_name: &str) -> &'static [&'static str] {
        if command_name == PRINT_ADDRESS {
            &["enable", "absolute", "disable"]
        } else if TOGGLES.iter().any(|t| t.command_name() == command_name) {
            &["enable", "disable"]
        } else {
            &[]
        }
    }

    /// コマンド引数のキーワードを補完する
    pub fn complete_argument(command_name: &str, text: &str) -> Vec<String> {
        Self::keywords(command_name)
            .iter()
            .filter(|keyword| keyword.starts_with(text))
            .map(|keyword| keyword.to_string())
            .collect()
    }
}
