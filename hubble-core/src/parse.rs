//! パース関連のユーティリティ関数

use anyhow::Result;

/// アドレス文字列をu64にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use hubble_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))
    } else {
        s.parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
    }
}

/// アドレスリテラル（`@(0x7f00)`、`@z(42)`）
///
/// 表示時のアドレス併記と同じ書式を受け付けます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLiteral {
    /// アドレス、または圧縮参照のビット列
    pub value: u64,
    /// 圧縮参照か（`@z`）
    pub compressed: bool,
}

/// アドレスリテラルをパースする（`@` で始まらなければ None）
pub fn parse_address_literal(s: &str) -> Option<Result<AddressLiteral>> {
    let rest = s.trim().strip_prefix('@')?;
    let (rest, compressed) = match rest.strip_prefix('z') {
        Some(rest) => (rest, true),
        None => (rest, false),
    };
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(rest);
    Some(parse_address(inner).map(|value| AddressLiteral { value, compressed }))
}
