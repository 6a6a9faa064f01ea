//! 値デコード機能
//!
//! マネージド文字列、C文字列、基本型のビット列を表示用のテキストに変換します。

use crate::classified::PrimitiveKind;
use crate::errors::{InspectError, InspectResult};
use crate::type_bridge::{TypeBridge, ARRAY_DATA_FIELD, ARRAY_LENGTH_FIELD};
use crate::Result;
use hubble_target::{Memory, RawValue, TypeInfo};
use tracing::trace;

/// 文字列のデコードに失敗したときの表示
pub const INVALID_STRING: &str = "<Invalid String>";

/// C文字列が読めないときの表示
pub const INVALID_CSTRING: &str = "Invalid CString";

/// 文字列の格納形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCoder {
    /// `byte[]` に1バイト1文字（coder 0）
    Latin1,
    /// `byte[]` にUTF-16LEのバイト列（coder 1）
    Utf16,
    /// coder のない `char[]`（1要素2バイト）
    LegacyUtf16,
}

impl StringCoder {
    /// coder フィールドの値から格納形式を得る
    pub fn from_coder(coder: u64) -> Option<Self> {
        match coder {
            0 => Some(StringCoder::Latin1),
            1 => Some(StringCoder::Utf16),
            _ => None,
        }
    }

    /// backing 配列の1要素から取り出すバイト数
    pub fn bytes_per_unit(self) -> usize {
        match self {
            StringCoder::Latin1 | StringCoder::Utf16 => 1,
            StringCoder::LegacyUtf16 => 2,
        }
    }
}

/// backing 配列の要素列をテキストにデコードする
pub fn decode_code_units(units: &[u64], coder: StringCoder) -> InspectResult<String> {
    let bytes_per_unit = coder.bytes_per_unit();
    let mask = (1u64 << (8 * bytes_per_unit)) - 1;
    let mut data = Vec::with_capacity(units.len() * bytes_per_unit);
    for unit in units {
        data.extend_from_slice(&(unit & mask).to_le_bytes()[..bytes_per_unit]);
    }

    match coder {
        StringCoder::Latin1 => Ok(data.iter().map(|b| *b as char).collect()),
        StringCoder::Utf16 | StringCoder::LegacyUtf16 => {
            if data.len() % 2 != 0 {
                return Err(InspectError::DecodeFailure(format!(
                    "odd number of UTF-16 bytes ({})",
                    data.len()
                )));
            }
            let code_units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&code_units).map_err(|e| InspectError::DecodeFailure(e.to_string()))
        }
    }
}

/// マネージド文字列を読み取る
///
/// backing 配列が null なら `None` を返します（空文字列とは区別します）。
pub fn read_java_string(
    bridge: &TypeBridge<'_>,
    string: &RawValue,
) -> InspectResult<Option<String>> {
    let value = bridge.read_field(string, "value")?;
    if bridge.address_of(&value)? == 0 {
        return Ok(None);
    }

    let coder = match bridge.read_field(string, "coder") {
        Ok(coder) => StringCoder::from_coder(coder.bits).ok_or_else(|| {
            InspectError::DecodeFailure(format!("unknown string coder {}", coder.bits))
        })?,
        Err(_) => StringCoder::LegacyUtf16,
    };

    let length = sign_extend(bridge.read_field(&value, ARRAY_LENGTH_FIELD)?);
    let length = usize::try_from(length)
        .map_err(|_| InspectError::DecodeFailure(format!("negative string length {}", length)))?;
    let storage = bridge.read_field(&value, ARRAY_DATA_FIELD)?;
    let (element_size, base) = match (storage.type_info.as_ref(), storage.address) {
        (TypeInfo::Array { element_type, .. }, Some(base)) => (element_type.size(), base),
        _ => {
            return Err(InspectError::DecodeFailure(
                "string backing array has no element storage".to_string(),
            ))
        }
    };
    if element_size == 0 || element_size > 8 {
        return Err(InspectError::DecodeFailure(format!(
            "unsupported element size {}",
            element_size
        )));
    }

    let bytes = bridge.memory().read(base, length * element_size as usize)?;
    let units: Vec<u64> = bytes
        .chunks_exact(element_size as usize)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect();

    let text = decode_code_units(&units, coder)?;
    trace!("Decoded string ({:?}, length={}): {}", coder, length, text);
    Ok(Some(text))
}

/// NUL終端のバイト列を最大 `limit` 文字まで読み取る
///
/// ASCII以外のバイトは `?` に置き換え、上限に達したら `...` を付けます。
pub fn read_c_string(memory: &Memory<'_>, addr: u64, limit: usize) -> Result<String> {
    let mut text = String::new();
    for i in 0..limit {
        let byte = memory.read_u8(addr + i as u64)?;
        if byte == 0 {
            break;
        }
        text.push(if byte.is_ascii() { byte as char } else { '?' });
        if i + 1 == limit {
            text.push_str("...");
        }
    }
    Ok(text)
}

/// 引用符で囲み、制御文字をエスケープする
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x100 => {
                quoted.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// 値の型サイズに合わせて符号拡張する
pub fn sign_extend(value: RawValue) -> i64 {
    match value.type_info.size() {
        1 => value.bits as u8 as i8 as i64,
        2 => value.bits as u16 as i16 as i64,
        4 => value.bits as u32 as i32 as i64,
        _ => value.bits as i64,
    }
}

/// 基本型のビット列を表示用の文字列にする
pub fn decode_primitive(kind: PrimitiveKind, bits: u64) -> String {
    match kind {
        PrimitiveKind::Boolean => (bits & 0xff != 0).to_string(),
        PrimitiveKind::Byte => (bits as u8 as i8).to_string(),
        PrimitiveKind::Short => (bits as u16 as i16).to_string(),
        PrimitiveKind::Int => (bits as u32 as i32).to_string(),
        PrimitiveKind::Long => (bits as i64).to_string(),
        PrimitiveKind::Float => f32::from_bits(bits as u32).to_string(),
        PrimitiveKind::Double => f64::from_bits(bits).to_string(),
        PrimitiveKind::Char => match char::from_u32(bits as u16 as u32) {
            Some(c) => {
                let quoted = quote(&c.to_string());
                format!("'{}'", &quoted[1..quoted.len() - 1])
            }
            // 単独のサロゲート
            None => (bits as u16).to_string(),
        },
    }
}
