//! 型情報と値ハンドル
//!
//! ホストデバッガが提供する型記述子と、型付きの生の値を表現します。

use std::rc::Rc;

/// 圧縮参照型の型名に付くプレフィックス
pub const COMPRESSED_REF_PREFIX: &str = "_z_.";

/// 型情報
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    /// 基本型（`int`, `long`, `char` など）
    Primitive {
        name: String,
        size: u64,
    },
    /// ポインタ型
    ///
    /// マネージド参照では `name` と `pointee` はどちらもクラス名になります。
    /// 圧縮参照の場合は `_z_.` プレフィックス付きの名前です。
    Pointer {
        name: String,
        pointee: String,
        size: u64,
    },
    /// typedef
    Typedef {
        name: String,
        target: String,
    },
    /// 固定長配列型（ランタイムヘッダを持たないネイティブ配列）
    Array {
        element_type: Box<TypeInfo>,
        length: Option<u64>,
    },
    /// 構造体型（マネージドクラスのレイアウトもこれで表す）
    Struct {
        name: String,
        size: u64,
        fields: Vec<FieldInfo>,
    },
    /// 不明な型
    Unknown,
}

/// フィールドの格納場所
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    /// インスタンスフィールド（オブジェクト先頭からのバイトオフセット）
    Offset(u64),
    /// 静的フィールド（絶対アドレス）
    Static(u64),
}

/// フィールド情報
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// フィールド名
    pub name: String,
    /// 格納場所
    pub location: FieldLocation,
    /// 型情報
    pub type_info: TypeInfo,
}

impl FieldInfo {
    /// インスタンスフィールドを作成する
    pub fn instance(name: impl Into<String>, offset: u64, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            location: FieldLocation::Offset(offset),
            type_info,
        }
    }

    /// 静的フィールドを作成する
    pub fn static_field(name: impl Into<String>, address: u64, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            location: FieldLocation::Static(address),
            type_info,
        }
    }

    /// 静的フィールドかどうか
    pub fn is_static(&self) -> bool {
        matches!(self.location, FieldLocation::Static(_))
    }
}

impl TypeInfo {
    /// 基本型を作成する
    pub fn primitive(name: impl Into<String>, size: u64) -> Self {
        TypeInfo::Primitive {
            name: name.into(),
            size,
        }
    }

    /// マネージド参照型を作成する
    ///
    /// `compressed` が真なら4バイトの圧縮参照になります。
    pub fn reference(class_name: &str, compressed: bool) -> Self {
        let (name, size) = if compressed {
            (format!("{}{}", COMPRESSED_REF_PREFIX, class_name), 4)
        } else {
            (class_name.to_string(), 8)
        };
        TypeInfo::Pointer {
            pointee: name.clone(),
            name,
            size,
        }
    }

    /// 型名を取得する
    pub fn name(&self) -> String {
        match self {
            TypeInfo::Primitive { name, .. } => name.clone(),
            TypeInfo::Pointer { name, .. } => name.clone(),
            TypeInfo::Typedef { name, .. } => name.clone(),
            TypeInfo::Array {
                element_type,
                length,
            } => format!("{}[{}]", element_type.name(), length.unwrap_or(0)),
            TypeInfo::Struct { name, .. } => name.clone(),
            TypeInfo::Unknown => "?".to_string(),
        }
    }

    /// 型のサイズを取得する
    pub fn size(&self) -> u64 {
        match self {
            TypeInfo::Primitive { size, .. } => *size,
            TypeInfo::Pointer { size, .. } => *size,
            TypeInfo::Struct { size, .. } => *size,
            TypeInfo::Array {
                element_type,
                length,
            } => element_type.size() * length.unwrap_or(0),
            TypeInfo::Typedef { .. } | TypeInfo::Unknown => 0,
        }
    }

    /// 構造体のフィールド一覧（構造体以外は空）
    pub fn fields(&self) -> &[FieldInfo] {
        match self {
            TypeInfo::Struct { fields, .. } => fields,
            _ => &[],
        }
    }

    /// 名前でフィールドを検索する
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// ポインタ型かどうか
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeInfo::Pointer { .. })
    }
}

/// 参照の表現形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    /// 圧縮参照（デコードが必要）
    Compressed,
    /// 生アドレス
    Uncompressed,
}

/// 圧縮参照のデコーダ
///
/// ランタイムが提供するデコード型（`_z_.class`）から一度だけ得られ、
/// 以後はプロセス全体で使い回されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceDecoder {
    /// ヒープベースアドレス
    pub heap_base: u64,
    /// シフト量
    pub shift: u32,
}

impl ReferenceDecoder {
    /// 圧縮参照を絶対アドレスに変換する（0はnullのまま）
    pub fn decode(&self, compressed: u64) -> u64 {
        if compressed == 0 {
            return 0;
        }
        self.heap_base.wrapping_add(compressed << self.shift)
    }

    /// 絶対アドレスを圧縮参照に変換する
    pub fn encode(&self, address: u64) -> u64 {
        if address == 0 {
            return 0;
        }
        address.wrapping_sub(self.heap_base) >> self.shift
    }
}

/// 型付きの生の値
///
/// ホストから借りたメモリ上の値（または即値）と、その静的型の組です。
#[derive(Debug, Clone, PartialEq)]
pub struct RawValue {
    /// 静的型
    pub type_info: Rc<TypeInfo>,
    /// 値のビット列（参照なら格納されたビット列、基本型なら即値）
    pub bits: u64,
    /// 値が格納されているアドレス（レジスタ上の値や合成値では None）
    pub address: Option<u64>,
}

impl RawValue {
    /// 値を作成する
    pub fn new(type_info: impl Into<Rc<TypeInfo>>, bits: u64, address: Option<u64>) -> Self {
        Self {
            type_info: type_info.into(),
            bits,
            address,
        }
    }

    /// 静的型の型名
    pub fn type_name(&self) -> String {
        self.type_info.name()
    }

    /// 参照の表現形式を取得する
    pub fn reference_form(&self) -> ReferenceForm {
        if self.type_name().starts_with(COMPRESSED_REF_PREFIX) {
            ReferenceForm::Compressed
        } else {
            ReferenceForm::Uncompressed
        }
    }

    /// 圧縮参照かどうか
    pub fn is_compressed(&self) -> bool {
        self.reference_form() == ReferenceForm::Compressed
    }

    /// 同じビット列を別の型として再解釈する
    pub fn cast(&self, type_info: impl Into<Rc<TypeInfo>>) -> Self {
        Self {
            type_info: type_info.into(),
            bits: self.bits,
            address: self.address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_type_names() {
        let plain = TypeInfo::reference("java.lang.String", false);
        assert_eq!(plain.name(), "java.lang.String");
        assert_eq!(plain.size(), 8);

        let compressed = TypeInfo::reference("java.lang.String", true);
        assert_eq!(compressed.name(), "_z_.java.lang.String");
        assert_eq!(compressed.size(), 4);
    }

    #[test]
    fn test_reference_form() {
        let value = RawValue::new(TypeInfo::reference("java.lang.Object", true), 0x10, None);
        assert_eq!(value.reference_form(), ReferenceForm::Compressed);

        let value = RawValue::new(TypeInfo::reference("java.lang.Object", false), 0x10, None);
        assert_eq!(value.reference_form(), ReferenceForm::Uncompressed);
    }

    #[test]
    fn test_decoder_keeps_null() {
        let decoder = ReferenceDecoder {
            heap_base: 0x1000_0000,
            shift: 3,
        };
        assert_eq!(decoder.decode(0), 0);
        assert_eq!(decoder.decode(2), 0x1000_0010);
        assert_eq!(decoder.encode(0x1000_0010), 2);
    }

    #[test]
    fn test_array_type_name() {
        let array = TypeInfo::Array {
            element_type: Box::new(TypeInfo::primitive("int", 4)),
            length: Some(5),
        };
        assert_eq!(array.name(), "int[5]");
        assert_eq!(array.size(), 20);
    }
}
