//! レジスタアクセス機能

use crate::Result;

/// AMD64 のレジスタ（DWARFレジスタ番号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// フレームポインタ
    Rbp,
    /// スタックポインタ
    Rsp,
    /// 命令ポインタ
    Rip,
}

impl Register {
    /// DWARFレジスタ番号を取得する
    pub fn dwarf_number(self) -> u16 {
        match self {
            Register::Rbp => 6,
            Register::Rsp => 7,
            Register::Rip => 16,
        }
    }

    /// レジスタ名を取得する
    pub fn name(self) -> &'static str {
        match self {
            Register::Rbp => "rbp",
            Register::Rsp => "rsp",
            Register::Rip => "rip",
        }
    }
}

/// フレームのスタックポインタと命令ポインタ
///
/// フレームの識別子としても、アンワインダが報告する呼び出し元のレジスタ集合としても使います。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRegisterState {
    pub sp: u64,
    pub ip: u64,
}

impl FrameRegisterState {
    pub fn new(sp: u64, ip: u64) -> Self {
        Self { sp, ip }
    }
}

/// まだ実体化されていないフレーム
///
/// ホストのアンワインダがフレームごとに渡します。
pub trait PendingFrame {
    /// レジスタを読み取る
    fn read_register(&self, reg: Register) -> Result<u64>;

    /// スタックポインタと命令ポインタを読み取る
    fn register_state(&self) -> Result<FrameRegisterState> {
        Ok(FrameRegisterState {
            sp: self.read_register(Register::Rsp)?,
            ip: self.read_register(Register::Rip)?,
        })
    }
}

impl PendingFrame for FrameRegisterState {
    fn read_register(&self, reg: Register) -> Result<u64> {
        match reg {
            Register::Rsp => Ok(self.sp),
            Register::Rip => Ok(self.ip),
            other => Err(anyhow::anyhow!(
                "Register {} is not available in this frame",
                other.name()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwarf_numbers() {
        assert_eq!(Register::Rbp.dwarf_number(), 6);
        assert_eq!(Register::Rsp.dwarf_number(), 7);
        assert_eq!(Register::Rip.dwarf_number(), 16);
    }

    #[test]
    fn test_register_state_as_pending_frame() {
        let state = FrameRegisterState::new(0x7ffe_0000, 0x40_1000);
        assert_eq!(state.register_state().unwrap(), state);
        assert!(state.read_register(Register::Rbp).is_err());
    }
}
