//! 分類済みの値

use hubble_target::{RawValue, TypeInfo};
use std::rc::Rc;

/// Java の基本型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
}

impl PrimitiveKind {
    /// 型記述子の1文字コードから基本型を得る（`I` → int）
    pub fn from_descriptor(code: char) -> Option<Self> {
        match code {
            'Z' => Some(PrimitiveKind::Boolean),
            'B' => Some(PrimitiveKind::Byte),
            'C' => Some(PrimitiveKind::Char),
            'D' => Some(PrimitiveKind::Double),
            'F' => Some(PrimitiveKind::Float),
            'I' => Some(PrimitiveKind::Int),
            'J' => Some(PrimitiveKind::Long),
            'S' => Some(PrimitiveKind::Short),
            _ => None,
        }
    }

    /// 型名から基本型を得る
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(PrimitiveKind::Boolean),
            "byte" => Some(PrimitiveKind::Byte),
            "char" => Some(PrimitiveKind::Char),
            "double" => Some(PrimitiveKind::Double),
            "float" => Some(PrimitiveKind::Float),
            "int" => Some(PrimitiveKind::Int),
            "long" => Some(PrimitiveKind::Long),
            "short" => Some(PrimitiveKind::Short),
            _ => None,
        }
    }

    /// 型名
    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Short => "short",
        }
    }
}

/// 配列として表示される値
///
/// マネージド配列、ネイティブ配列、ArrayList の高水準表現で共通に使います。
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// 配列（またはコレクション）自身の値
    pub value: RawValue,
    /// 表示用の見出し（`int[3]`、`java.util.ArrayList(2)` など）
    pub header: String,
    /// 要素型
    pub element_type: Rc<TypeInfo>,
    /// 先頭要素のアドレス
    pub elements_at: u64,
    /// 要素数
    pub length: u64,
}

impl ArrayValue {
    /// i番目の要素のアドレス
    pub fn element_address(&self, index: u64) -> u64 {
        self.elements_at + index * self.element_type.size()
    }
}

/// 表示ヒント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayHint {
    /// 子を名前なしで並べる
    Array,
    /// 引用符付きの文字列
    String,
}

/// 分類済みの値
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedValue {
    /// null 参照
    Null,
    /// `java.lang.String`
    String(RawValue),
    /// `CPointer(char)` が指すNUL終端バイト列
    CString(RawValue),
    /// 配列
    Array(ArrayValue),
    /// 列挙型（`name` が null なら None）
    Enum {
        value: RawValue,
        name: Option<String>,
        ordinal: i64,
    },
    /// その他のオブジェクト（外部構造体では型名を明示する）
    Object {
        value: RawValue,
        type_name: Option<String>,
    },
    /// Java の基本型
    Primitive { kind: PrimitiveKind, value: RawValue },
}

impl ClassifiedValue {
    /// 元の値（null には無い）
    pub fn raw(&self) -> Option<&RawValue> {
        match self {
            ClassifiedValue::Null => None,
            ClassifiedValue::String(value) | ClassifiedValue::CString(value) => Some(value),
            ClassifiedValue::Array(array) => Some(&array.value),
            ClassifiedValue::Enum { value, .. }
            | ClassifiedValue::Object { value, .. }
            | ClassifiedValue::Primitive { value, .. } => Some(value),
        }
    }

    /// 表示ヒント
    pub fn display_hint(&self) -> Option<DisplayHint> {
        match self {
            ClassifiedValue::Array(_) => Some(DisplayHint::Array),
            ClassifiedValue::String(_) | ClassifiedValue::CString(_) => Some(DisplayHint::String),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_codes() {
        assert_eq!(PrimitiveKind::from_descriptor('J'), Some(PrimitiveKind::Long));
        assert_eq!(PrimitiveKind::from_descriptor('Z'), Some(PrimitiveKind::Boolean));
        assert_eq!(PrimitiveKind::from_descriptor('L'), None);
        assert_eq!(PrimitiveKind::Long.type_name(), "long");
    }

    #[test]
    fn test_element_address() {
        let array = ArrayValue {
            value: RawValue::new(TypeInfo::reference("int[]", false), 0x1000, None),
            header: "int[4]".to_string(),
            element_type: Rc::new(TypeInfo::primitive("int", 4)),
            elements_at: 0x1010,
            length: 4,
        };
        assert_eq!(array.element_address(0), 0x1010);
        assert_eq!(array.element_address(3), 0x101c);
    }
}
