//! インスペクタ
//!
//! 1つのデバッグセッションに1つだけ存在し、表示設定・循環検出器・
//! 参照デコーダのキャッシュを保持します。型ブリッジや値フォーマッタは
//! これを借用する軽量なビューです。

use crate::config::PrintConfig;
use crate::cycle::CycleDetector;
use crate::type_bridge::TypeBridge;
use crate::value_formatter::ValueFormatter;
use crate::Result;
use hubble_target::{DebugAccess, Memory, RawValue, ReferenceDecoder};
use std::cell::{Cell, RefCell};
use tracing::{debug, trace};

/// 圧縮参照のデコードに使う型名
pub const DECODE_TYPE: &str = "_z_.java.lang.Object";

/// インスペクタ
pub struct Inspector {
    access: Box<dyn DebugAccess>,
    config: Cell<PrintConfig>,
    cycles: RefCell<CycleDetector>,
    decoder: Cell<Option<ReferenceDecoder>>,
}

impl Inspector {
    /// デフォルト設定でインスペクタを作成する
    pub fn new(access: Box<dyn DebugAccess>) -> Self {
        Self::with_config(access, PrintConfig::default())
    }

    /// 設定を指定してインスペクタを作成する
    pub fn with_config(access: Box<dyn DebugAccess>, config: PrintConfig) -> Self {
        Self {
            access,
            config: Cell::new(config),
            cycles: RefCell::new(CycleDetector::new()),
            decoder: Cell::new(None),
        }
    }

    /// デバッグアクセスを取得する
    pub fn access(&self) -> &dyn DebugAccess {
        self.access.as_ref()
    }

    /// メモリアクセスを取得する
    pub fn memory(&self) -> Memory<'_> {
        Memory::new(self.access.as_ref())
    }

    /// 現在の表示設定
    pub fn config(&self) -> PrintConfig {
        self.config.get()
    }

    /// 表示設定を置き換える
    pub fn set_config(&self, config: PrintConfig) {
        self.config.set(config);
    }

    /// 表示設定を更新する
    pub fn update_config(&self, f: impl FnOnce(&mut PrintConfig)) {
        let mut config = self.config.get();
        f(&mut config);
        self.config.set(config);
    }

    /// 型ブリッジを取得する
    pub fn bridge(&self) -> TypeBridge<'_> {
        TypeBridge::new(self)
    }

    /// 値フォーマッタを取得する
    pub fn formatter(&self) -> ValueFormatter<'_> {
        ValueFormatter::new(self)
    }

    /// 圧縮参照のデコーダを取得する
    ///
    /// 最初に成功した結果だけをキャッシュし、失敗は次回に再試行します。
    pub fn reference_decoder(&self) -> Result<ReferenceDecoder> {
        if let Some(decoder) = self.decoder.get() {
            return Ok(decoder);
        }
        let decoder = self.access.reference_decoder(DECODE_TYPE).ok_or_else(|| {
            anyhow::anyhow!(
                "Cannot decode compressed references: '{}' is not available",
                DECODE_TYPE
            )
        })?;
        debug!(
            "Resolved reference decoder: heap_base=0x{:x}, shift={}",
            decoder.heap_base, decoder.shift
        );
        self.decoder.set(Some(decoder));
        Ok(decoder)
    }

    /// 子を親の下に登録し、子をそのまま返す
    ///
    /// 循環検出が無効な場合、実行時型メタデータを持たない値、null は記録しません。
    pub fn register_child(&self, parent: &RawValue, child: RawValue) -> RawValue {
        let config = self.config();
        if !config.cycle_check {
            return child;
        }

        let bridge = self.bridge();
        if !bridge.has_type_metadata(&child) {
            return child;
        }

        match (bridge.address_of(&child), bridge.address_of(parent)) {
            (Ok(0), _) => {}
            (Ok(child_addr), Ok(parent_addr)) => {
                let cyclic = self
                    .cycles
                    .borrow_mut()
                    .register(parent_addr, child_addr, config.depth_limit);
                if cyclic {
                    trace!(
                        "Collapsing cyclic child 0x{:x} of 0x{:x}",
                        child_addr, parent_addr
                    );
                }
            }
            (child_result, parent_result) => {
                trace!(
                    "Skipping cycle registration: child_ok={}, parent_ok={}",
                    child_result.is_ok(),
                    parent_result.is_ok()
                );
            }
        }
        child
    }

    /// 値が循環のメンバーとして記録されているか
    pub fn is_cycle(&self, value: &RawValue) -> bool {
        if !self.config().cycle_check {
            return false;
        }
        let bridge = self.bridge();
        if !bridge.has_type_metadata(value) {
            return false;
        }
        match bridge.address_of(value) {
            Ok(addr) => self.cycles.borrow().is_cycle(addr),
            Err(_) => false,
        }
    }

    /// 循環検出の状態を消す（トップレベルの表示・プロンプト表示の前）
    pub fn reset_cycles(&self) {
        self.cycles.borrow_mut().reset();
    }

    /// 制限を外した解決用スコープに入る
    ///
    /// 返されたガードが破棄されると、配列制限・深さ制限・循環検出の設定が
    /// 入る前の値に戻ります。
    pub fn lookup_scope(&self) -> LookupScope<'_> {
        let saved = self.config();
        self.set_config(saved.unlimited());
        self.reset_cycles();
        LookupScope {
            inspector: self,
            saved,
        }
    }
}

/// 解決用スコープのガード
pub struct LookupScope<'a> {
    inspector: &'a Inspector,
    saved: PrintConfig,
}

impl Drop for LookupScope<'_> {
    fn drop(&mut self) {
        let saved = self.saved;
        self.inspector.update_config(|config| {
            config.array_limit = saved.array_limit;
            config.depth_limit = saved.depth_limit;
            config.cycle_check = saved.cycle_check;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubble_target::testing::FakeTarget;

    #[test]
    fn test_lookup_scope_restores_limits() {
        let inspector = Inspector::new(Box::new(FakeTarget::new()));
        inspector.update_config(|c| c.array_limit = 3);

        {
            let _scope = inspector.lookup_scope();
            let config = inspector.config();
            assert_eq!(config.array_limit, 1 << 31);
            assert_eq!(config.depth_limit, 1 << 31);
            assert!(!config.cycle_check);
        }

        let config = inspector.config();
        assert_eq!(config.array_limit, 3);
        assert_eq!(config.depth_limit, 1);
        assert!(config.cycle_check);
    }

    #[test]
    fn test_reference_decoder_failure_is_not_cached() {
        let inspector = Inspector::new(Box::new(FakeTarget::new()));
        assert!(inspector.reference_decoder().is_err());
        assert!(inspector.reference_decoder().is_err());
    }

    #[test]
    fn test_reference_decoder_is_resolved() {
        let mut target = FakeTarget::new();
        target.enable_compression(0x1000_0000, 3);
        let inspector = Inspector::new(Box::new(target));
        let decoder = inspector.reference_decoder().unwrap();
        assert_eq!(decoder.heap_base, 0x1000_0000);
        assert_eq!(decoder.shift, 3);
    }
}
