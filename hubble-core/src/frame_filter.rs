//! バックトレースのフレーム表示

use std::path::Path;

/// 脱最適化スタブのフレームに代わる表示
pub const DEOPT_FRAMES: &str = "[DEOPT FRAMES ...]";

/// ホストから渡されるフレーム情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// プログラムカウンタ
    pub pc: u64,
    /// スタックポインタ
    pub sp: u64,
    /// 関数名（シグネチャ付きのこともある）
    pub name: Option<String>,
    /// インライン展開されたフレームか
    pub inline: bool,
    /// ソースファイル
    pub file: Option<String>,
    /// 行番号
    pub line: Option<u32>,
}

/// 表示用に加工したフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedFrame {
    /// 関数欄の表示
    pub function: String,
    /// 引数とローカル変数を隠すか
    pub hide_variables: bool,
}

/// フレームフィルタ
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameFilter {
    deopt_stub: Option<u64>,
}

impl FrameFilter {
    pub fn new(deopt_stub: Option<u64>) -> Self {
        Self { deopt_stub }
    }

    /// フレームを表示用に加工する
    pub fn decorate(&self, frame: &FrameInfo) -> DecoratedFrame {
        if self.deopt_stub.is_some_and(|stub| stub == frame.pc) {
            return DecoratedFrame {
                function: DEOPT_FRAMES.to_string(),
                hide_variables: true,
            };
        }

        DecoratedFrame {
            function: Self::function_name(frame),
            hide_variables: false,
        }
    }

    fn function_name(frame: &FrameInfo) -> String {
        let Some(name) = frame.name.as_deref() else {
            return format!("Unknown Frame at 0x{:x}", frame.sp);
        };

        let mut function = name.split('(').next().unwrap_or(name).to_string();
        if frame.inline {
            function.insert_str(0, "<-- ");
        }

        if let Some(file) = &frame.file {
            let basename = Path::new(file)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            function.push_str(&format!("({}:{})", basename, frame.line.unwrap_or(0)));
        }
        function
    }
}
