//! メモリアクセス機能
//!
//! デバッグアクセスインターフェース越しにターゲットのメモリを読み取ります。
//! ターゲットは変更できないため、書き込みは提供しません。

use crate::access::DebugAccess;
use crate::types::{RawValue, TypeInfo};
use crate::Result;
use std::rc::Rc;

/// メモリから読み取り可能な型
pub trait MemoryReadable: Sized {
    /// バイト配列から値を構築
    fn from_le_bytes(bytes: &[u8]) -> Result<Self>;

    /// 型のサイズ（バイト数）
    fn size() -> usize;
}

impl MemoryReadable for u64 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u64 array (expected 8 bytes)",
                bytes.len()
            )
        })?;
        Ok(u64::from_le_bytes(array))
    }

    fn size() -> usize {
        8
    }
}

impl MemoryReadable for u32 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 4] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u32 array (expected 4 bytes)",
                bytes.len()
            )
        })?;
        Ok(u32::from_le_bytes(array))
    }

    fn size() -> usize {
        4
    }
}

impl MemoryReadable for u16 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 2] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Failed to convert {} bytes to u16 array (expected 2 bytes)",
                bytes.len()
            )
        })?;
        Ok(u16::from_le_bytes(array))
    }

    fn size() -> usize {
        2
    }
}

impl MemoryReadable for u8 {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow::anyhow!("Cannot read u8 from empty bytes"));
        }
        Ok(bytes[0])
    }

    fn size() -> usize {
        1
    }
}

/// メモリアクセス
pub struct Memory<'a> {
    access: &'a dyn DebugAccess,
}

impl<'a> Memory<'a> {
    /// メモリアクセスを作成する
    pub fn new(access: &'a dyn DebugAccess) -> Self {
        Self { access }
    }

    /// メモリからデータを読み取る
    pub fn read(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        let data = self.access.read_memory(addr, size)?;
        if data.len() != size {
            return Err(anyhow::anyhow!(
                "Short read at 0x{:x}: expected {} bytes, got {}",
                addr,
                size,
                data.len()
            ));
        }
        Ok(data)
    }

    /// 型付き値を読み取る（ジェネリック版）
    ///
    /// # Examples
    /// ```ignore
    /// let value: u64 = memory.read_typed(addr)?;
    /// let value: u32 = memory.read_typed(addr)?;
    /// ```
    pub fn read_typed<T: MemoryReadable>(&self, addr: u64) -> Result<T> {
        let bytes = self.read(addr, T::size())?;
        T::from_le_bytes(&bytes)
    }

    /// u64値を読み取る（リトルエンディアン）
    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        self.read_typed(addr)
    }

    /// u32値を読み取る（リトルエンディアン）
    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        self.read_typed(addr)
    }

    /// u16値を読み取る（リトルエンディアン）
    pub fn read_u16(&self, addr: u64) -> Result<u16> {
        self.read_typed(addr)
    }

    /// u8値を読み取る
    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        self.read_typed(addr)
    }

    /// 指定サイズ（1/2/4/8バイト）の符号なし整数を読み取る
    pub fn read_sized(&self, addr: u64, size: u64) -> Result<u64> {
        match size {
            1 => Ok(self.read_u8(addr)? as u64),
            2 => Ok(self.read_u16(addr)? as u64),
            4 => Ok(self.read_u32(addr)? as u64),
            8 => self.read_u64(addr),
            _ => Err(anyhow::anyhow!(
                "Unsupported scalar size {} at 0x{:x}",
                size,
                addr
            )),
        }
    }

    /// アドレスにある型付きの値を読み取る
    ///
    /// 基本型とポインタはビット列を読み込みます。
    /// 構造体や配列は場所だけを保持し、中身はフィールド単位で読みます。
    pub fn read_value(&self, type_info: Rc<TypeInfo>, addr: u64) -> Result<RawValue> {
        let bits = match type_info.as_ref() {
            TypeInfo::Primitive { size, .. } | TypeInfo::Pointer { size, .. } => {
                self.read_sized(addr, *size)?
            }
            _ => 0,
        };
        Ok(RawValue::new(type_info, bits, Some(addr)))
    }
}
