//! テスト用の偽ターゲット
//!
//! バイト単位の疑似メモリ、型テーブル、シンボルテーブル、スコープ内の変数を持ち、
//! マネージドオブジェクト（ハブ、文字列、配列）をランタイムと同じ形で配置します。
//!
//! レイアウト規約:
//! - すべてのオブジェクトはオフセット0に `__hub__`（`java.lang.Class` への8バイト参照）を持つ
//! - インスタンスフィールドは8バイトのスロットに順に並ぶ
//! - 配列は `__length__`（int）をオフセット8、`__array__` をオフセット16に持つ

use crate::access::{DebugAccess, ISOLATE_SYMBOL};
use crate::types::{
    FieldInfo, RawValue, ReferenceDecoder, TypeInfo, COMPRESSED_REF_PREFIX,
};
use crate::Result;
use std::collections::HashMap;
use std::rc::Rc;

/// ヒープ領域の開始アドレス
pub const HEAP_START: u64 = 0x1000_0000;

const HEADER_SIZE: u64 = 8;
const SLOT_SIZE: u64 = 8;
const ARRAY_LENGTH_OFFSET: u64 = 8;
const ARRAY_DATA_OFFSET: u64 = 16;

/// 偽ターゲット
#[derive(Debug)]
pub struct FakeTarget {
    memory: HashMap<u64, u8>,
    next_alloc: u64,
    types: HashMap<String, Rc<TypeInfo>>,
    symbols: HashMap<String, u64>,
    variables: HashMap<String, RawValue>,
    visible: Vec<String>,
    statics: Vec<String>,
    decoder: Option<ReferenceDecoder>,
    hubs: HashMap<String, u64>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTarget {
    /// Java 9以降のレイアウト（`byte[]` + coder）の文字列を持つターゲットを作成する
    pub fn new() -> Self {
        let mut target = Self::empty();
        target.define_class(
            "java.lang.String",
            &[
                ("value", TypeInfo::reference("byte[]", false)),
                ("coder", TypeInfo::primitive("byte", 1)),
                ("hash", TypeInfo::primitive("int", 4)),
            ],
        );
        target
    }

    /// Java 8 のレイアウト（`char[]`、coderなし）の文字列を持つターゲットを作成する
    pub fn new_legacy() -> Self {
        let mut target = Self::empty();
        target.define_class(
            "java.lang.String",
            &[
                ("value", TypeInfo::reference("char[]", false)),
                ("hash", TypeInfo::primitive("int", 4)),
            ],
        );
        target
    }

    fn empty() -> Self {
        let mut target = Self {
            memory: HashMap::new(),
            next_alloc: HEAP_START,
            types: HashMap::new(),
            symbols: HashMap::new(),
            variables: HashMap::new(),
            visible: Vec::new(),
            statics: Vec::new(),
            decoder: None,
            hubs: HashMap::new(),
        };

        for (name, size) in [
            ("boolean", 1),
            ("byte", 1),
            ("char", 2),
            ("short", 2),
            ("int", 4),
            ("float", 4),
            ("long", 8),
            ("double", 8),
        ] {
            target.add_type(TypeInfo::primitive(name, size));
        }

        target.define_class("java.lang.Object", &[]);
        target.define_class(
            "java.lang.Class",
            &[("name", TypeInfo::reference("java.lang.String", false))],
        );
        target.define_array_class(TypeInfo::primitive("byte", 1));
        target.define_array_class(TypeInfo::primitive("char", 2));
        target.symbols.insert(ISOLATE_SYMBOL.to_string(), 0x40_0000);
        target
    }

    // ---- メモリ ----

    /// ゼロ初期化された領域を確保する（8バイト境界）
    pub fn alloc(&mut self, size: u64) -> u64 {
        let addr = self.next_alloc;
        let size = size.max(1);
        self.map(addr, size);
        self.next_alloc = (addr + size + 7) & !7;
        addr
    }

    /// 領域をゼロ初期化してマップする
    pub fn map(&mut self, addr: u64, size: u64) {
        for a in addr..addr + size {
            self.memory.entry(a).or_insert(0);
        }
    }

    /// バイト列を書き込む（未マップならマップする）
    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) {
        self.write_bytes(addr, &[value]);
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// 指定サイズでビット列を書き込む
    pub fn write_sized(&mut self, addr: u64, size: u64, bits: u64) {
        let bytes = bits.to_le_bytes();
        let size = size.min(8) as usize;
        self.write_bytes(addr, &bytes[..size]);
    }

    // ---- 型 ----

    /// 型を登録する
    pub fn add_type(&mut self, type_info: TypeInfo) -> Rc<TypeInfo> {
        let type_info = Rc::new(type_info);
        self.types.insert(type_info.name(), type_info.clone());
        type_info
    }

    /// 登録済みの型を取得する
    pub fn get_type(&self, name: &str) -> Rc<TypeInfo> {
        self.lookup_type(name)
            .unwrap_or_else(|| panic!("type '{}' is not defined", name))
    }

    /// 型を削除する
    pub fn remove_type(&mut self, name: &str) {
        self.types.remove(name);
    }

    /// マネージドクラスを定義する
    ///
    /// `__hub__` の後にインスタンスフィールドを8バイトスロットで並べます。
    pub fn define_class(&mut self, name: &str, fields: &[(&str, TypeInfo)]) -> Rc<TypeInfo> {
        let mut infos = vec![FieldInfo::instance(
            "__hub__",
            0,
            TypeInfo::reference("java.lang.Class", false),
        )];
        let mut offset = HEADER_SIZE;
        for (field_name, field_type) in fields {
            infos.push(FieldInfo::instance(*field_name, offset, field_type.clone()));
            offset += SLOT_SIZE;
        }
        self.add_type(TypeInfo::Struct {
            name: name.to_string(),
            size: offset,
            fields: infos,
        })
    }

    /// 静的フィールドをクラスに追加し、その格納アドレスを返す
    pub fn add_static_field(
        &mut self,
        class: &str,
        name: &str,
        type_info: TypeInfo,
        bits: u64,
    ) -> u64 {
        let storage = self.alloc(SLOT_SIZE);
        self.write_sized(storage, type_info.size(), bits);

        let class_type = self.get_type(class);
        if let TypeInfo::Struct {
            name: class_name,
            size,
            fields,
        } = class_type.as_ref()
        {
            let mut fields = fields.clone();
            fields.push(FieldInfo::static_field(name, storage, type_info));
            self.add_type(TypeInfo::Struct {
                name: class_name.clone(),
                size: *size,
                fields,
            });
        }
        storage
    }

    /// 配列クラスを定義する（`int[]`, `java.lang.Object[]` など）
    pub fn define_array_class(&mut self, element_type: TypeInfo) -> Rc<TypeInfo> {
        let element_name = strip_prefix(&element_type.name()).to_string();
        let name = format!("{}[]", element_name);
        let fields = vec![
            FieldInfo::instance("__hub__", 0, TypeInfo::reference("java.lang.Class", false)),
            FieldInfo::instance(
                "__length__",
                ARRAY_LENGTH_OFFSET,
                TypeInfo::primitive("int", 4),
            ),
            FieldInfo::instance(
                "__array__",
                ARRAY_DATA_OFFSET,
                TypeInfo::Array {
                    element_type: Box::new(element_type),
                    length: Some(0),
                },
            ),
        ];
        self.add_type(TypeInfo::Struct {
            name,
            size: ARRAY_DATA_OFFSET,
            fields,
        })
    }

    /// 圧縮参照を有効にする
    pub fn enable_compression(&mut self, heap_base: u64, shift: u32) {
        self.decoder = Some(ReferenceDecoder { heap_base, shift });
    }

    /// 圧縮参照のデコーダ
    pub fn decoder(&self) -> Option<ReferenceDecoder> {
        self.decoder
    }

    // ---- オブジェクト ----

    /// 実行時型名を持つハブを取得（なければ作成）する
    pub fn hub_for(&mut self, runtime_name: &str) -> u64 {
        if let Some(hub) = self.hubs.get(runtime_name) {
            return *hub;
        }
        let class_type = self.get_type("java.lang.Class");
        let hub = self.alloc(class_type.size());
        self.hubs.insert(runtime_name.to_string(), hub);
        let name = self.new_string(runtime_name);
        self.set_field(hub, "java.lang.Class", "name", name);
        hub
    }

    /// クラスのインスタンスを確保する
    pub fn new_object(&mut self, class: &str) -> u64 {
        let class_type = self.get_type(class);
        let obj = self.alloc(class_type.size());
        let hub = self.hub_for(&runtime_name_for(class));
        self.write_u64(obj, hub);
        obj
    }

    /// ハブの実行時型名を任意の文字列で上書きしたインスタンスを確保する
    pub fn new_object_with_hub_name(&mut self, class: &str, runtime_name: &str) -> u64 {
        let class_type = self.get_type(class);
        let obj = self.alloc(class_type.size());
        let hub = self.hub_for(runtime_name);
        self.write_u64(obj, hub);
        obj
    }

    /// フィールドにビット列を書き込む
    pub fn set_field(&mut self, obj: u64, class: &str, field: &str, bits: u64) {
        let class_type = self.get_type(class);
        let info = class_type
            .field(field)
            .unwrap_or_else(|| panic!("field '{}' is not defined in '{}'", field, class));
        let addr = match info.location {
            crate::types::FieldLocation::Offset(offset) => obj + offset,
            crate::types::FieldLocation::Static(addr) => addr,
        };
        self.write_sized(addr, info.type_info.size(), bits);
    }

    /// 参照フィールドにオブジェクトを書き込む（圧縮型ならエンコードする）
    pub fn set_reference_field(&mut self, obj: u64, class: &str, field: &str, target: u64) {
        let class_type = self.get_type(class);
        let compressed = class_type
            .field(field)
            .map(|f| f.type_info.name().starts_with(COMPRESSED_REF_PREFIX))
            .unwrap_or(false);
        let bits = if compressed { self.encode(target) } else { target };
        self.set_field(obj, class, field, bits);
    }

    /// 文字列を作成する（全文字がLatin-1ならcoder 0、それ以外はcoder 1）
    pub fn new_string(&mut self, text: &str) -> u64 {
        let latin1 = text.chars().all(|c| (c as u32) <= 0xff);
        self.new_string_with_coder(text, if latin1 { 0 } else { 1 })
    }

    /// coder を指定して文字列を作成する
    ///
    /// Java 8 レイアウトのターゲットでは coder を無視し `char[]` に格納します。
    pub fn new_string_with_coder(&mut self, text: &str, coder: u8) -> u64 {
        let string_type = self.get_type("java.lang.String");
        let legacy = string_type.field("coder").is_none();

        let value = if legacy {
            let units: Vec<u64> = text.encode_utf16().map(u64::from).collect();
            self.new_array("char[]", &units)
        } else if coder == 0 {
            let units: Vec<u64> = text.chars().map(|c| c as u64 & 0xff).collect();
            self.new_array("byte[]", &units)
        } else {
            let units: Vec<u64> = text
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes())
                .map(u64::from)
                .collect();
            self.new_array("byte[]", &units)
        };
        self.new_string_from_backing(value, coder)
    }

    /// 任意の backing 配列（0 なら null）で文字列を作成する
    pub fn new_string_from_backing(&mut self, value: u64, coder: u8) -> u64 {
        let string = self.new_object("java.lang.String");
        self.set_field(string, "java.lang.String", "value", value);
        if self.get_type("java.lang.String").field("coder").is_some() {
            self.set_field(string, "java.lang.String", "coder", coder as u64);
        }
        string
    }

    /// 配列オブジェクトを作成する
    ///
    /// `elements` は要素型のサイズで書き込まれます（参照要素は絶対アドレスを渡す）。
    pub fn new_array(&mut self, class: &str, elements: &[u64]) -> u64 {
        let element_type = self.array_element_type(class);
        let elem_size = element_type.size();
        let compressed = element_type.name().starts_with(COMPRESSED_REF_PREFIX);

        let obj = self.alloc(ARRAY_DATA_OFFSET + elem_size * elements.len() as u64);
        let hub = self.hub_for(&runtime_name_for(class));
        self.write_u64(obj, hub);
        self.write_u32(obj + ARRAY_LENGTH_OFFSET, elements.len() as u32);
        for (i, elem) in elements.iter().enumerate() {
            let bits = if compressed { self.encode(*elem) } else { *elem };
            self.write_sized(obj + ARRAY_DATA_OFFSET + i as u64 * elem_size, elem_size, bits);
        }
        obj
    }

    fn array_element_type(&self, class: &str) -> TypeInfo {
        let class_type = self.get_type(class);
        match class_type.field("__array__").map(|f| &f.type_info) {
            Some(TypeInfo::Array { element_type, .. }) => element_type.as_ref().clone(),
            _ => panic!("'{}' is not an array class", class),
        }
    }

    fn encode(&self, addr: u64) -> u64 {
        match self.decoder {
            Some(decoder) => decoder.encode(addr),
            None => addr,
        }
    }

    /// 非圧縮参照の値を作る
    pub fn reference(&self, class: &str, addr: u64) -> RawValue {
        RawValue::new(TypeInfo::reference(class, false), addr, None)
    }

    /// 圧縮参照の値を作る
    pub fn compressed_reference(&self, class: &str, addr: u64) -> RawValue {
        RawValue::new(TypeInfo::reference(class, true), self.encode(addr), None)
    }

    // ---- シンボル・スコープ ----

    /// シンボルを追加する
    pub fn add_symbol(&mut self, name: &str, addr: u64) {
        self.symbols.insert(name.to_string(), addr);
    }

    /// シンボルを削除する
    pub fn remove_symbol(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    /// 名前で評価可能な変数（グローバル等）を追加する
    pub fn add_variable(&mut self, name: &str, value: RawValue) {
        self.variables.insert(name.to_string(), value);
    }

    /// 可視なローカル変数を追加する
    pub fn add_local(&mut self, name: &str, value: RawValue) {
        self.visible.push(name.to_string());
        self.variables.insert(name.to_string(), value);
    }

    /// 静的変数を追加する（補完用の名前一覧にも載る）
    pub fn add_static_variable(&mut self, name: &str, value: RawValue) {
        self.statics.push(name.to_string());
        self.variables.insert(name.to_string(), value);
    }
}

impl DebugAccess for FakeTarget {
    fn read_memory(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        (0..size as u64)
            .map(|i| {
                let a = addr.wrapping_add(i);
                self.memory
                    .get(&a)
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("Cannot access memory at address 0x{:x}", a))
            })
            .collect()
    }

    fn lookup_type(&self, name: &str) -> Option<Rc<TypeInfo>> {
        self.types.get(strip_prefix(name)).cloned()
    }

    fn reference_decoder(&self, _decode_type: &str) -> Option<ReferenceDecoder> {
        self.decoder
    }

    fn resolve_symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    fn symbol_at(&self, addr: u64) -> Option<String> {
        self.symbols
            .iter()
            .find(|(_, a)| **a == addr)
            .map(|(name, _)| name.clone())
    }

    fn lookup_variable(&self, name: &str) -> Option<RawValue> {
        self.variables.get(name).cloned()
    }

    fn visible_variable_names(&self) -> Vec<String> {
        self.visible.clone()
    }

    fn static_variable_names(&self) -> Vec<String> {
        self.statics.clone()
    }
}

fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(COMPRESSED_REF_PREFIX).unwrap_or(name)
}

/// クラス名からハブに格納される実行時型名を作る（`int[]` → `[I`）
pub fn runtime_name_for(class: &str) -> String {
    let mut element = class;
    let mut dims = 0;
    while let Some(stripped) = element.strip_suffix("[]") {
        element = stripped;
        dims += 1;
    }
    if dims == 0 {
        return class.to_string();
    }
    let code = match element {
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "double" => "D".to_string(),
        "float" => "F".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "short" => "S".to_string(),
        other => format!("L{};", other),
    };
    format!("{}{}", "[".repeat(dims), code)
}
