//! デバッグセッション
//!
//! ホストデバッガとの接点です。モジュールの登録、値の表示、プロンプトフック、
//! 設定コマンド、`pp`、補完、アンワインドとフレーム表示をまとめて提供します。

use crate::command::{AddressMode, Command, Limit, Toggle, PRINT_ADDRESS};
use crate::complete::{self, StaticVarTrie};
use crate::errors::{self, WARN_NOT_RUNTIME_MODULE, WARN_NO_TYPE_METADATA};
use crate::expr_eval::ExpressionResolver;
use crate::frame_filter::{DecoratedFrame, FrameFilter, FrameInfo};
use crate::unwinder::{FrameUnwinder, UnwindInfo, DEOPT_STUB_SYMBOL};
use hubble_runtime::{InspectError, InspectResult, Inspector, PrintConfig};
use hubble_target::{DebugAccess, ModuleHandle, PendingFrame, RawValue, ISOLATE_SYMBOL};
use tracing::{debug, info, warn};

/// ランタイムのクラス型（これが無ければ値を解釈できない）
const CLASS_TYPE: &str = "java.lang.Class";

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// ランタイムのモジュールがまだ登録されていない
    Dormant,
    /// 値の解釈が有効
    Active,
    /// 初期化に失敗して無効化された
    Disabled,
}

/// デバッグセッション
pub struct Session {
    inspector: Inspector,
    state: SessionState,
    modules: Vec<ModuleHandle>,
    deopt_stub: Option<u64>,
    unwinder: Option<FrameUnwinder>,
    frame_filter: Option<FrameFilter>,
    last: Option<RawValue>,
    static_vars: Option<StaticVarTrie>,
}

impl Session {
    /// 休止状態のセッションを作成する
    pub fn new(access: Box<dyn DebugAccess>) -> Self {
        Self::with_config(access, PrintConfig::default())
    }

    /// 設定を指定してセッションを作成する
    pub fn with_config(access: Box<dyn DebugAccess>, config: PrintConfig) -> Self {
        Self {
            inspector: Inspector::with_config(access, config),
            state: SessionState::Dormant,
            modules: Vec::new(),
            deopt_stub: None,
            unwinder: None,
            frame_filter: None,
            last: None,
            static_vars: None,
        }
    }

    /// セッションの状態
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// インスペクタを取得する
    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    /// 値の表示を担当しているモジュール
    pub fn modules(&self) -> &[ModuleHandle] {
        &self.modules
    }

    /// 脱最適化スタブのアドレス
    pub fn deopt_stub(&self) -> Option<u64> {
        self.deopt_stub
    }

    /// 最後に `pp` で解決した値
    pub fn last(&self) -> Option<&RawValue> {
        self.last.as_ref()
    }

    /// ロードされたモジュールを登録する
    ///
    /// ランタイムのシンボルを持つ最初のモジュールでセッションを初期化します。
    /// 初期化後にロードされたモジュールも表示の対象として追加します。
    pub fn register(&mut self, module: &ModuleHandle) -> SessionState {
        match self.state {
            SessionState::Active => {
                debug!("Registering printer for new module: {}", module.filename);
                self.modules.push(module.clone());
            }
            SessionState::Disabled => {
                debug!("Session is disabled; ignoring module {}", module.filename);
            }
            SessionState::Dormant => {
                if self.inspector.access().resolve_symbol(ISOLATE_SYMBOL).is_some() {
                    self.bootstrap(module);
                } else {
                    warn!("{}: {}", WARN_NOT_RUNTIME_MODULE, module.filename);
                }
            }
        }
        self.state
    }

    fn bootstrap(&mut self, module: &ModuleHandle) {
        let access = self.inspector.access();
        if access.lookup_type(CLASS_TYPE).is_none() {
            warn!("{}: {}", WARN_NO_TYPE_METADATA, module.filename);
            self.state = SessionState::Disabled;
            return;
        }

        self.deopt_stub = access.resolve_symbol(DEOPT_STUB_SYMBOL);
        self.unwinder = self
            .deopt_stub
            .and_then(|stub| FrameUnwinder::new(access, stub));
        self.frame_filter = Some(FrameFilter::new(self.deopt_stub));
        self.modules.push(module.clone());
        self.state = SessionState::Active;

        info!(
            "Java debug helpers initialized for {}: deopt_stub={:?}, unwinder={}",
            module.filename,
            self.deopt_stub.map(|addr| format!("0x{:x}", addr)),
            self.unwinder.is_some()
        );
    }

    /// プロンプト表示前のフック
    pub fn on_prompt(&self) {
        self.inspector.reset_cycles();
    }

    /// 値を表示する
    ///
    /// 初期化前や無効化後は汎用表示になります。
    pub fn print(&self, value: &RawValue) -> String {
        let formatter = self.inspector.formatter();
        match self.state {
            SessionState::Active => formatter.format_value(value),
            SessionState::Dormant | SessionState::Disabled => formatter.format_generic(value),
        }
    }

    /// パス式を解決する（制限を外した解決用スコープの中で評価する）
    pub fn resolve(&self, path: &str) -> Option<RawValue> {
        let _scope = self.inspector.lookup_scope();
        ExpressionResolver::new(&self.inspector, self.last.as_ref()).resolve(path)
    }

    /// パス式を解決する（見つからなければ `ResolutionMiss`）
    pub fn try_resolve(&self, path: &str) -> InspectResult<RawValue> {
        self.resolve(path)
            .ok_or_else(|| InspectError::ResolutionMiss(path.to_string()))
    }

    /// `pp` コマンド
    ///
    /// 解決できた値を `$last` として記録し、通常の制限で表示します。
    pub fn pretty_print(&mut self, path: &str) -> String {
        let resolved = self.try_resolve(path);
        self.static_vars = None;
        match resolved {
            Ok(value) => {
                let text = self.print(&value);
                self.last = Some(value);
                text
            }
            Err(e) => {
                debug!("pp failed: {}", e);
                errors::no_expression(path)
            }
        }
    }

    /// `pp` の引数を補完する
    pub fn complete(&mut self, text: &str) -> Vec<String> {
        let access = self.inspector.access();
        if self.inspector.config().complete_static_variables && self.static_vars.is_none() {
            debug!("Building static variable cache");
            self.static_vars = Some(StaticVarTrie::build(access.static_variable_names()));
        }
        let statics = if self.inspector.config().complete_static_variables {
            self.static_vars.as_ref()
        } else {
            None
        };

        let _scope = self.inspector.lookup_scope();
        let resolver = ExpressionResolver::new(&self.inspector, self.last.as_ref());
        complete::complete(&resolver, || access.visible_variable_names(), statics, text)
    }

    /// コマンドを実行し、表示するテキストを返す
    pub fn execute(&mut self, command: Command) -> String {
        match command {
            Command::Toggle(toggle, None) => {
                let enabled = self.toggle_value(toggle);
                format!("{} is {}", toggle.command_name(), enabled_text(enabled))
            }
            Command::Toggle(toggle, Some(enabled)) => {
                self.set_toggle(toggle, enabled);
                String::new()
            }
            Command::PrintAddress(None) => {
                let config = self.inspector.config();
                format!(
                    "{} is {}\nwith address mode {}",
                    PRINT_ADDRESS,
                    enabled_text(config.with_address),
                    if config.absolute_address {
                        "all absolute"
                    } else {
                        "normal"
                    }
                )
            }
            Command::PrintAddress(Some(mode)) => {
                self.inspector.update_config(|c| match mode {
                    AddressMode::Disabled => c.with_address = false,
                    AddressMode::Normal => {
                        c.with_address = true;
                        c.absolute_address = false;
                    }
                    AddressMode::Absolute => {
                        c.with_address = true;
                        c.absolute_address = true;
                    }
                });
                String::new()
            }
            Command::Limit(limit, None) => {
                let config = self.inspector.config();
                let value = match limit {
                    Limit::CString => config.cstr_limit,
                    Limit::Array => config.array_limit,
                    Limit::Depth => config.depth_limit,
                };
                format!("{} current value {}", limit.command_name(), value)
            }
            Command::Limit(limit, Some(value)) => {
                self.inspector.update_config(|c| match limit {
                    Limit::CString => c.cstr_limit = value,
                    Limit::Array => c.array_limit = value,
                    Limit::Depth => c.depth_limit = value,
                });
                String::new()
            }
            Command::PrettyPrint(path) => self.pretty_print(&path),
        }
    }

    fn toggle_value(&self, toggle: Toggle) -> bool {
        let config = self.inspector.config();
        match toggle {
            Toggle::Print => config.enabled,
            Toggle::HighLevelReps => config.high_level_reps,
            Toggle::SelfrefCheck => config.cycle_check,
            Toggle::StaticFields => config.static_fields,
            Toggle::CompleteStaticVariables => config.complete_static_variables,
        }
    }

    fn set_toggle(&self, toggle: Toggle, enabled: bool) {
        self.inspector.update_config(|c| match toggle {
            Toggle::Print => c.enabled = enabled,
            Toggle::HighLevelReps => c.high_level_reps = enabled,
            Toggle::SelfrefCheck => c.cycle_check = enabled,
            Toggle::StaticFields => c.static_fields = enabled,
            Toggle::CompleteStaticVariables => c.complete_static_variables = enabled,
        });
        if toggle == Toggle::SelfrefCheck && enabled {
            self.inspector.reset_cycles();
        }
    }

    /// 未実体化のフレームをアンワインドする（対象外なら None）
    pub fn unwind(&self, frame: &dyn PendingFrame) -> Option<UnwindInfo> {
        let unwinder = self.unwinder.as_ref()?;
        unwinder.unwind(&self.inspector.memory(), frame)
    }

    /// バックトレースのフレームを表示用に加工する
    pub fn decorate_frame(&self, frame: &FrameInfo) -> DecoratedFrame {
        let filter = self.frame_filter.unwrap_or_default();
        if frame.name.is_some() {
            return filter.decorate(frame);
        }

        // 名前のないフレームはシンボルで補う
        let named = FrameInfo {
            name: self.inspector.access().symbol_at(frame.pc),
            ..frame.clone()
        };
        filter.decorate(&named)
    }
}

fn enabled_text(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubble_target::testing::FakeTarget;

    #[test]
    fn test_new_session_is_dormant() {
        let session = Session::new(Box::new(FakeTarget::new()));
        assert_eq!(session.state(), SessionState::Dormant);
        assert!(session.modules().is_empty());
    }

    #[test]
    fn test_enabling_selfref_check_keeps_other_settings() {
        let mut session = Session::new(Box::new(FakeTarget::new()));
        session.execute(Command::Limit(Limit::Array, Some(4)));
        session.execute(Command::Toggle(Toggle::SelfrefCheck, Some(false)));
        session.execute(Command::Toggle(Toggle::SelfrefCheck, Some(true)));

        let config = session.inspector().config();
        assert!(config.cycle_check);
        assert_eq!(config.array_limit, 4);
    }
}
