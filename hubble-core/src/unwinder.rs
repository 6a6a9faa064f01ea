//! 脱最適化フレームのアンワインダ
//!
//! 脱最適化スタブの入口で止まっているフレームは、標準の CFI では記述できません。
//! スタックポインタが指す `DeoptimizedFrame` レコードから元のフレームサイズを読み、
//! 呼び出し元のスタックポインタと戻りアドレスを復元します。
//! それ以外のフレームは扱わず、ホストの標準アンワインドに任せます。

use hubble_target::{DebugAccess, FieldLocation, FrameRegisterState, Memory, PendingFrame, Register};
use tracing::{debug, trace};

/// 脱最適化スタブのシンボル
pub const DEOPT_STUB_SYMBOL: &str = "com.oracle.svm.core.deopt.Deoptimizer.deoptStub";

/// 脱最適化フレームのレコード型
pub const DEOPTIMIZED_FRAME_TYPE: &str = "com.oracle.svm.core.deopt.DeoptimizedFrame";

/// 元のフレームサイズを持つフィールド
pub const FRAME_SIZE_FIELD: &str = "sourceTotalFrameSize";

/// アンワインド結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindInfo {
    /// アンワインドしたフレームの識別子
    pub frame_id: FrameRegisterState,
    /// 呼び出し元のレジスタ
    pub caller: FrameRegisterState,
}

impl UnwindInfo {
    /// 呼び出し元で保存されたレジスタの一覧
    pub fn saved_registers(&self) -> [(Register, u64); 2] {
        [
            (Register::Rsp, self.caller.sp),
            (Register::Rip, self.caller.ip),
        ]
    }
}

/// 脱最適化フレームのアンワインダ
#[derive(Debug, Clone, Copy)]
pub struct FrameUnwinder {
    deopt_stub: u64,
    frame_size_offset: u64,
    frame_size_width: u64,
}

impl FrameUnwinder {
    /// アンワインダを作成する
    ///
    /// `DeoptimizedFrame` のレイアウトが見つからなければ None を返します。
    pub fn new(access: &dyn DebugAccess, deopt_stub: u64) -> Option<Self> {
        let Some(frame_type) = access.lookup_type(DEOPTIMIZED_FRAME_TYPE) else {
            debug!("No layout for {}", DEOPTIMIZED_FRAME_TYPE);
            return None;
        };
        let field = frame_type.field(FRAME_SIZE_FIELD)?;
        let FieldLocation::Offset(offset) = field.location else {
            debug!("{} is not an instance field", FRAME_SIZE_FIELD);
            return None;
        };

        Some(Self {
            deopt_stub,
            frame_size_offset: offset,
            frame_size_width: field.type_info.size(),
        })
    }

    /// 脱最適化スタブのアドレス
    pub fn deopt_stub(&self) -> u64 {
        self.deopt_stub
    }

    /// 未実体化のフレームをアンワインドする
    ///
    /// 対象外のフレームや読み取りに失敗した場合は None を返します。
    pub fn unwind(&self, memory: &Memory<'_>, frame: &dyn PendingFrame) -> Option<UnwindInfo> {
        let state = match frame.register_state() {
            Ok(state) => state,
            Err(e) => {
                trace!("Cannot read frame registers: {}", e);
                return None;
            }
        };
        self.unwind_at(memory, state)
    }

    /// スタックポインタと命令ポインタからアンワインドする
    pub fn unwind_at(&self, memory: &Memory<'_>, frame: FrameRegisterState) -> Option<UnwindInfo> {
        if frame.ip != self.deopt_stub {
            return None;
        }

        let caller = match self.caller_of(memory, frame) {
            Ok(caller) => caller,
            Err(e) => {
                debug!("Deopt frame unwinding failed at sp=0x{:x}: {}", frame.sp, e);
                return None;
            }
        };
        trace!(
            "Unwound deopt frame: caller sp=0x{:x}, ip=0x{:x}",
            caller.sp,
            caller.ip
        );
        Some(UnwindInfo {
            frame_id: frame,
            caller,
        })
    }

    fn caller_of(
        &self,
        memory: &Memory<'_>,
        frame: FrameRegisterState,
    ) -> crate::Result<FrameRegisterState> {
        let deopt_frame = memory.read_u64(frame.sp)?;
        let frame_size = memory.read_sized(
            deopt_frame.wrapping_add(self.frame_size_offset),
            self.frame_size_width,
        )?;

        let caller_sp = frame.sp.checked_add(frame_size).ok_or_else(|| {
            anyhow::anyhow!("Frame size 0x{:x} overflows the stack pointer", frame_size)
        })?;
        let caller_ip = memory.read_u64(caller_sp.wrapping_sub(8))?;
        Ok(FrameRegisterState::new(caller_sp, caller_ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubble_target::testing::FakeTarget;
    use hubble_target::{FieldInfo, TypeInfo};

    const STUB: u64 = 0x50_0000;

    fn target_with_layout() -> FakeTarget {
        let mut target = FakeTarget::new();
        target.add_type(TypeInfo::Struct {
            name: DEOPTIMIZED_FRAME_TYPE.to_string(),
            size: 24,
            fields: vec![FieldInfo::instance(
                FRAME_SIZE_FIELD,
                16,
                TypeInfo::primitive("long", 8),
            )],
        });
        target
    }

    #[test]
    fn test_requires_frame_layout() {
        let target = FakeTarget::new();
        assert!(FrameUnwinder::new(&target, STUB).is_none());
        assert!(FrameUnwinder::new(&target_with_layout(), STUB).is_some());
    }

    #[test]
    fn test_unreadable_record_is_inapplicable() {
        let target = target_with_layout();
        let unwinder = FrameUnwinder::new(&target, STUB).unwrap();
        let memory = Memory::new(&target);
        assert!(unwinder
            .unwind_at(&memory, FrameRegisterState::new(0x7000_0000, STUB))
            .is_none());
    }
}
