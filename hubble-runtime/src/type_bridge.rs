//! 型ブリッジ
//!
//! ホストの静的型とランタイムの型メタデータ（ハブ）の間を橋渡しします。
//! 参照のデコード、フィールドの読み取り、実行時型へのキャスト、値の分類を担当します。
//!
//! マネージドオブジェクトはオフセット0に `__hub__` を持ち、
//! ハブ（`java.lang.Class`）の `name` フィールドに実行時型名が格納されています。

use crate::classified::{ArrayValue, ClassifiedValue, PrimitiveKind};
use crate::config::PrintConfig;
use crate::decode::{self, INVALID_STRING};
use crate::errors::{InspectError, InspectResult};
use crate::inspector::Inspector;
use crate::Result;
use hubble_target::{
    FieldInfo, FieldLocation, Memory, RawValue, TypeInfo, COMPRESSED_REF_PREFIX,
};
use regex::Regex;
use std::rc::Rc;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// 型メタデータ（ハブ）へのフィールド名
pub const HUB_FIELD: &str = "__hub__";
/// 配列長のフィールド名
pub const ARRAY_LENGTH_FIELD: &str = "__length__";
/// 配列本体のフィールド名
pub const ARRAY_DATA_FIELD: &str = "__array__";

const STRING_CLASS: &str = "java.lang.String";
const ARRAY_LIST_CLASS: &str = "java.util.ArrayList";
const MAX_TYPEDEF_DEPTH: usize = 8;

/// 型名に埋め込まれた圧縮参照のマーカーを取り除く
///
/// `_z_.java.lang.String[3]` → `java.lang.String[3]`
pub fn strip_compression(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"_z_\.(\w+\.)").expect("Failed to compile compression pattern")
    });
    pattern.replace_all(name, "$1").into_owned()
}

/// 先頭の圧縮参照プレフィックスを取り除く
pub fn strip_reference_prefix(name: &str) -> &str {
    name.strip_prefix(COMPRESSED_REF_PREFIX).unwrap_or(name)
}

/// ハブに格納されている実行時型名
///
/// 先頭の `[` の数が配列の次元で、要素は `L<クラス名>;` か基本型の1文字コードです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeTypeName {
    /// 要素のクラス名（配列でなければクラス名そのもの）
    pub element: String,
    /// 配列の次元
    pub dimensions: usize,
}

impl RuntimeTypeName {
    /// 実行時型名を解析する
    pub fn parse(raw: &str) -> Self {
        let element = raw.trim_start_matches('[');
        let dimensions = raw.len() - element.len();
        if dimensions == 0 {
            return Self {
                element: raw.to_string(),
                dimensions,
            };
        }

        let element = if let Some(class) = element
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
        {
            class.to_string()
        } else {
            let mut chars = element.chars();
            match (chars.next(), chars.next()) {
                (Some(code), None) => PrimitiveKind::from_descriptor(code)
                    .map(|kind| kind.type_name().to_string())
                    .unwrap_or_else(|| element.to_string()),
                _ => element.to_string(),
            }
        };
        Self {
            element,
            dimensions,
        }
    }

    /// ホストの型名（`int[][]` など）
    pub fn type_name(&self) -> String {
        format!("{}{}", self.element, "[]".repeat(self.dimensions))
    }
}

/// 型ブリッジ
#[derive(Clone, Copy)]
pub struct TypeBridge<'a> {
    inspector: &'a Inspector,
}

impl<'a> TypeBridge<'a> {
    /// 型ブリッジを作成する
    pub fn new(inspector: &'a Inspector) -> Self {
        Self { inspector }
    }

    /// メモリアクセスを取得する
    pub fn memory(&self) -> Memory<'a> {
        self.inspector.memory()
    }

    /// 型名を解決する（typedef は実体までたどる）
    pub fn resolve_type(&self, name: &str) -> Option<Rc<TypeInfo>> {
        let access = self.inspector.access();
        let mut current = access.lookup_type(name)?;
        for _ in 0..MAX_TYPEDEF_DEPTH {
            let target = match current.as_ref() {
                TypeInfo::Typedef { target, .. } => target.clone(),
                _ => return Some(current),
            };
            current = access.lookup_type(&target)?;
        }
        None
    }

    /// 値が指す（または値自身の）構造体レイアウト
    pub fn layout_of(&self, value: &RawValue) -> Option<Rc<TypeInfo>> {
        let layout = match value.type_info.as_ref() {
            TypeInfo::Pointer { pointee, .. } => self.resolve_type(pointee)?,
            TypeInfo::Struct { .. } => value.type_info.clone(),
            TypeInfo::Typedef { name, .. } => self.resolve_type(name)?,
            _ => return None,
        };
        match layout.as_ref() {
            TypeInfo::Struct { .. } => Some(layout),
            _ => None,
        }
    }

    /// 実行時型メタデータを持つ値か
    pub fn has_type_metadata(&self, value: &RawValue) -> bool {
        self.layout_of(value)
            .map(|layout| layout.field(HUB_FIELD).is_some())
            .unwrap_or(false)
    }

    /// 値の実効アドレス（圧縮参照はデコード後）
    ///
    /// 参照なら参照先、構造体なら格納場所のアドレスです。null は0のまま返します。
    pub fn address_of(&self, value: &RawValue) -> Result<u64> {
        match value.type_info.as_ref() {
            TypeInfo::Pointer { .. } => {
                if value.bits == 0 || !value.is_compressed() {
                    return Ok(value.bits);
                }
                let decoder = self.inspector.reference_decoder()?;
                Ok(decoder.decode(value.bits))
            }
            _ => value.address.ok_or_else(|| {
                anyhow::anyhow!("Value of type '{}' has no address", value.type_name())
            }),
        }
    }

    /// 宣言順のフィールド一覧
    pub fn fields(&self, value: &RawValue) -> Vec<FieldInfo> {
        self.layout_of(value)
            .map(|layout| layout.fields().to_vec())
            .unwrap_or_default()
    }

    /// 名前でフィールドを読み取る
    pub fn read_field(&self, value: &RawValue, name: &str) -> InspectResult<RawValue> {
        let layout = self
            .layout_of(value)
            .ok_or_else(|| InspectError::TypeNotFound(value.type_name()))?;
        let field = layout.field(name).ok_or_else(|| InspectError::FieldNotFound {
            type_name: layout.name(),
            field: name.to_string(),
        })?;
        self.read_field_info(value, field)
    }

    /// フィールド情報に従ってフィールドを読み取る
    pub fn read_field_info(
        &self,
        value: &RawValue,
        field: &FieldInfo,
    ) -> InspectResult<RawValue> {
        let addr = match field.location {
            FieldLocation::Offset(offset) => {
                let base = self.address_of(value)?;
                if base == 0 {
                    return Err(InspectError::DecodeFailure(format!(
                        "null dereference while reading field '{}'",
                        field.name
                    )));
                }
                base + offset
            }
            FieldLocation::Static(addr) => addr,
        };
        let field_value = self
            .inspector
            .memory()
            .read_value(Rc::new(field.type_info.clone()), addr)?;
        Ok(field_value)
    }

    /// ハブから実行時型名を読み取る（ハブの名前が null なら None）
    pub fn runtime_type_name(&self, value: &RawValue) -> InspectResult<Option<String>> {
        let hub = self.read_field(value, HUB_FIELD)?;
        let name = self.read_field(&hub, "name")?;
        decode::read_java_string(self, &name)
    }

    /// 実行時型へキャストする
    ///
    /// 型名の取得や型の解決に失敗した場合は、元の値をそのまま返します。
    pub fn cast_to_runtime_type(&self, value: &RawValue) -> RawValue {
        if !value.type_info.is_pointer() {
            return value.clone();
        }
        let runtime_name = match self.runtime_type_name(value) {
            Ok(Some(name)) => name,
            Ok(None) => return value.clone(),
            Err(e) => {
                trace!("Cannot read runtime type name: {}", e);
                return value.clone();
            }
        };

        let class = RuntimeTypeName::parse(&runtime_name).type_name();
        if class == strip_reference_prefix(&value.type_name()) {
            return value.clone();
        }
        if self.resolve_type(&class).is_none() {
            debug!("Runtime type {} is not known to the host", class);
            return value.clone();
        }
        value.cast(TypeInfo::reference(&class, value.is_compressed()))
    }

    /// 値を分類する
    ///
    /// 表示が無効な場合や、型メタデータを持たず特別扱いもしない値は
    /// `InspectError::Unclassifiable` を返し、呼び出し側は汎用表示に切り替えます。
    pub fn classify(&self, value: &RawValue) -> InspectResult<ClassifiedValue> {
        let config = self.inspector.config();
        if !config.enabled {
            return Err(InspectError::Unclassifiable);
        }

        if self.has_type_metadata(value) {
            if self.address_of(value)? == 0 {
                return Ok(ClassifiedValue::Null);
            }
            let value = self.cast_to_runtime_type(value);
            return Ok(self.classify_managed(value, &config));
        }

        self.classify_foreign(value, &config)
    }

    fn classify_managed(&self, value: RawValue, config: &PrintConfig) -> ClassifiedValue {
        let class = strip_reference_prefix(&value.type_name()).to_string();
        if class == STRING_CLASS {
            return ClassifiedValue::String(value);
        }

        let layout = match self.layout_of(&value) {
            Some(layout) => layout,
            None => {
                return ClassifiedValue::Object {
                    value,
                    type_name: None,
                }
            }
        };

        if layout.field(ARRAY_LENGTH_FIELD).is_some() && layout.field(ARRAY_DATA_FIELD).is_some() {
            match self.managed_array(&value) {
                Ok(array) => return ClassifiedValue::Array(array),
                Err(e) => debug!("Cannot read array header of {}: {}", class, e),
            }
        }

        let is_enum = match (layout.field("name"), layout.field("ordinal")) {
            (Some(name), Some(_)) => strip_reference_prefix(&name.type_info.name()) == STRING_CLASS,
            _ => false,
        };
        if is_enum {
            match self.read_enum(&value) {
                Ok((name, ordinal)) => {
                    return ClassifiedValue::Enum {
                        value,
                        name,
                        ordinal,
                    }
                }
                Err(e) => debug!("Cannot read enum constant of {}: {}", class, e),
            }
        }

        if config.high_level_reps && class == ARRAY_LIST_CLASS {
            match self.array_list(&value) {
                Ok(array) => return ClassifiedValue::Array(array),
                Err(e) => debug!("Cannot build ArrayList representation: {}", e),
            }
        }

        ClassifiedValue::Object {
            value,
            type_name: None,
        }
    }

    fn classify_foreign(
        &self,
        value: &RawValue,
        config: &PrintConfig,
    ) -> InspectResult<ClassifiedValue> {
        match value.type_info.as_ref() {
            TypeInfo::Primitive { name, .. } => PrimitiveKind::from_type_name(name)
                .map(|kind| ClassifiedValue::Primitive {
                    kind,
                    value: value.clone(),
                })
                .ok_or(InspectError::Unclassifiable),
            TypeInfo::Array {
                element_type,
                length,
            } => {
                let elements_at = value.address.ok_or(InspectError::Unclassifiable)?;
                let length = length.unwrap_or(0);
                Ok(ClassifiedValue::Array(ArrayValue {
                    value: value.clone(),
                    header: format!("{}[{}]", strip_compression(&element_type.name()), length),
                    element_type: Rc::new(element_type.as_ref().clone()),
                    elements_at,
                    length,
                }))
            }
            TypeInfo::Pointer { name, .. } if value.bits != 0 => {
                if name.starts_with("CStruct ") || name.starts_with("RawStructure ") {
                    Ok(ClassifiedValue::Object {
                        value: value.clone(),
                        type_name: Some(name.clone()),
                    })
                } else if name.starts_with("CPointer(char) ") && config.cstr_limit > 0 {
                    Ok(ClassifiedValue::CString(value.clone()))
                } else {
                    Err(InspectError::Unclassifiable)
                }
            }
            _ => Err(InspectError::Unclassifiable),
        }
    }

    /// マネージド配列のヘッダを読み取る
    pub fn managed_array(&self, value: &RawValue) -> InspectResult<ArrayValue> {
        let length = decode::sign_extend(self.read_field(value, ARRAY_LENGTH_FIELD)?);
        let storage = self.read_field(value, ARRAY_DATA_FIELD)?;
        let element_type = match storage.type_info.as_ref() {
            TypeInfo::Array { element_type, .. } => Rc::new(element_type.as_ref().clone()),
            other => {
                return Err(InspectError::DecodeFailure(format!(
                    "'{}' is not an array storage",
                    other.name()
                )))
            }
        };
        let length = u64::try_from(length)
            .map_err(|_| InspectError::DecodeFailure(format!("negative array length {}", length)))?;
        let elements_at = storage.address.ok_or_else(|| {
            InspectError::DecodeFailure("array storage has no address".to_string())
        })?;

        Ok(ArrayValue {
            value: value.clone(),
            header: format!("{}[{}]", strip_compression(&element_type.name()), length),
            element_type,
            elements_at,
            length,
        })
    }

    fn read_enum(&self, value: &RawValue) -> InspectResult<(Option<String>, i64)> {
        let name = match self
            .read_field(value, "name")
            .and_then(|name| decode::read_java_string(self, &name))
        {
            Ok(name) => name,
            Err(e) => {
                debug!("Cannot decode enum name: {}", e);
                Some(INVALID_STRING.to_string())
            }
        };
        let ordinal = decode::sign_extend(self.read_field(value, "ordinal")?);
        Ok((name, ordinal))
    }

    /// `java.util.ArrayList` を要素の並びとして表す
    fn array_list(&self, value: &RawValue) -> InspectResult<ArrayValue> {
        let size = decode::sign_extend(self.read_field(value, "size")?);
        let data = self.read_field(value, "elementData")?;
        if self.address_of(&data)? == 0 {
            return Err(InspectError::DecodeFailure(
                "ArrayList has no element storage".to_string(),
            ));
        }
        let storage = self.managed_array(&self.cast_to_runtime_type(&data))?;
        let length = u64::try_from(size).unwrap_or(0).min(storage.length);

        Ok(ArrayValue {
            value: value.clone(),
            header: format!("{}({})", ARRAY_LIST_CLASS, size),
            element_type: storage.element_type,
            elements_at: storage.elements_at,
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubble_target::testing::FakeTarget;

    #[test]
    fn test_parse_runtime_type_names() {
        let parsed = RuntimeTypeName::parse("[[I");
        assert_eq!(parsed.dimensions, 2);
        assert_eq!(parsed.type_name(), "int[][]");

        let parsed = RuntimeTypeName::parse("[Ljava.lang.String;");
        assert_eq!(parsed.type_name(), "java.lang.String[]");

        let parsed = RuntimeTypeName::parse("java.util.HashMap");
        assert_eq!(parsed.dimensions, 0);
        assert_eq!(parsed.type_name(), "java.util.HashMap");
    }

    #[test]
    fn test_unterminated_descriptor_is_kept() {
        let parsed = RuntimeTypeName::parse("[Lfoo.Bar");
        assert_eq!(parsed.type_name(), "Lfoo.Bar[]");
    }

    #[test]
    fn test_strip_compression() {
        assert_eq!(strip_compression("_z_.java.lang.String[3]"), "java.lang.String[3]");
        assert_eq!(strip_compression("java.lang.Object"), "java.lang.Object");
        assert_eq!(strip_reference_prefix("_z_.java.lang.Object"), "java.lang.Object");
    }

    #[test]
    fn test_cast_to_runtime_type() {
        let mut target = FakeTarget::new();
        target.define_class("app.Shape", &[]);
        target.define_class("app.Circle", &[("radius", TypeInfo::primitive("int", 4))]);
        let circle = target.new_object("app.Circle");
        let value = target.reference("app.Shape", circle);

        let inspector = Inspector::new(Box::new(target));
        let cast = inspector.bridge().cast_to_runtime_type(&value);
        assert_eq!(cast.type_name(), "app.Circle");
        assert_eq!(cast.bits, circle);
    }

    #[test]
    fn test_cast_keeps_value_when_runtime_type_is_unknown() {
        let mut target = FakeTarget::new();
        target.define_class("app.Shape", &[]);
        let obj = target.new_object_with_hub_name("app.Shape", "app.Hidden");
        let value = target.reference("app.Shape", obj);

        let inspector = Inspector::new(Box::new(target));
        let cast = inspector.bridge().cast_to_runtime_type(&value);
        assert_eq!(cast, value);
    }

    #[test]
    fn test_cast_keeps_compression() {
        let mut target = FakeTarget::new();
        target.enable_compression(0x0fff_0000, 3);
        target.define_class("app.Shape", &[]);
        target.define_class("app.Square", &[]);
        let square = target.new_object("app.Square");
        let value = target.compressed_reference("app.Shape", square);

        let inspector = Inspector::new(Box::new(target));
        let bridge = inspector.bridge();
        let cast = bridge.cast_to_runtime_type(&value);
        assert_eq!(cast.type_name(), "_z_.app.Square");
        assert_eq!(bridge.address_of(&cast).unwrap(), square);
    }

    #[test]
    fn test_classify_null_reference() {
        let mut target = FakeTarget::new();
        target.define_class("app.Node", &[]);
        let value = target.reference("app.Node", 0);

        let inspector = Inspector::new(Box::new(target));
        let classified = inspector.bridge().classify(&value).unwrap();
        assert_eq!(classified, ClassifiedValue::Null);
    }

    #[test]
    fn test_classify_compressed_null() {
        let mut target = FakeTarget::new();
        target.define_class("app.Node", &[]);
        let value = target.compressed_reference("app.Node", 0);

        // デコーダがなくても null は判定できる
        let inspector = Inspector::new(Box::new(target));
        let classified = inspector.bridge().classify(&value).unwrap();
        assert_eq!(classified, ClassifiedValue::Null);
    }

    #[test]
    fn test_classify_kinds() {
        let mut target = FakeTarget::new();
        target.define_array_class(TypeInfo::primitive("int", 4));
        target.define_class(
            "app.Color",
            &[
                ("name", TypeInfo::reference("java.lang.String", false)),
                ("ordinal", TypeInfo::primitive("int", 4)),
            ],
        );
        let string = target.new_string("hi");
        let array = target.new_array("int[]", &[1, 2, 3]);
        let color = target.new_object("app.Color");
        let red = target.new_string("RED");
        target.set_field(color, "app.Color", "name", red);
        target.set_field(color, "app.Color", "ordinal", 2);

        let string = target.reference("java.lang.Object", string);
        let array = target.reference("java.lang.Object", array);
        let color = target.reference("java.lang.Object", color);

        let inspector = Inspector::new(Box::new(target));
        let bridge = inspector.bridge();
        assert!(matches!(bridge.classify(&string), Ok(ClassifiedValue::String(_))));
        match bridge.classify(&array) {
            Ok(ClassifiedValue::Array(array)) => {
                assert_eq!(array.header, "int[3]");
                assert_eq!(array.length, 3);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
        match bridge.classify(&color) {
            Ok(ClassifiedValue::Enum { name, ordinal, .. }) => {
                assert_eq!(name.as_deref(), Some("RED"));
                assert_eq!(ordinal, 2);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_foreign_values() {
        let target = FakeTarget::new();
        let inspector = Inspector::new(Box::new(target));
        let bridge = inspector.bridge();

        let int = RawValue::new(TypeInfo::primitive("int", 4), 7, None);
        assert!(matches!(
            bridge.classify(&int),
            Ok(ClassifiedValue::Primitive {
                kind: PrimitiveKind::Int,
                ..
            })
        ));

        let word = RawValue::new(TypeInfo::primitive("unsigned long", 8), 7, None);
        assert!(matches!(bridge.classify(&word), Err(InspectError::Unclassifiable)));

        let cstr_type = TypeInfo::Pointer {
            name: "CPointer(char) *".to_string(),
            pointee: "char".to_string(),
            size: 8,
        };
        let cstr = RawValue::new(cstr_type.clone(), 0x2000, None);
        assert!(matches!(bridge.classify(&cstr), Ok(ClassifiedValue::CString(_))));

        let null_cstr = RawValue::new(cstr_type, 0, None);
        assert!(matches!(bridge.classify(&null_cstr), Err(InspectError::Unclassifiable)));
    }

    #[test]
    fn test_cstring_disabled_by_zero_limit() {
        let inspector = Inspector::new(Box::new(FakeTarget::new()));
        inspector.update_config(|c| c.cstr_limit = 0);
        let cstr = RawValue::new(
            TypeInfo::Pointer {
                name: "CPointer(char) *".to_string(),
                pointee: "char".to_string(),
                size: 8,
            },
            0x2000,
            None,
        );
        assert!(inspector.bridge().classify(&cstr).is_err());
    }

    #[test]
    fn test_disabled_printing_is_unclassifiable() {
        let mut target = FakeTarget::new();
        let string = target.new_string("hi");
        let value = target.reference("java.lang.String", string);
        let inspector = Inspector::new(Box::new(target));
        inspector.update_config(|c| c.enabled = false);
        assert!(matches!(
            inspector.bridge().classify(&value),
            Err(InspectError::Unclassifiable)
        ));
    }

    #[test]
    fn test_typedef_pointee_is_resolved() {
        let mut target = FakeTarget::new();
        target.define_class("app.Node", &[]);
        target.add_type(TypeInfo::Typedef {
            name: "app.NodeAlias".to_string(),
            target: "app.Node".to_string(),
        });
        let node = target.new_object("app.Node");
        let value = RawValue::new(
            TypeInfo::Pointer {
                name: "app.NodeAlias".to_string(),
                pointee: "app.NodeAlias".to_string(),
                size: 8,
            },
            node,
            None,
        );

        let inspector = Inspector::new(Box::new(target));
        assert!(inspector.bridge().has_type_metadata(&value));
        assert!(matches!(
            inspector.bridge().classify(&value),
            Ok(ClassifiedValue::Object { .. })
        ));
    }
}
