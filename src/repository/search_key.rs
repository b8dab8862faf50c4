// ==========================================
// 食品询价管理 - 拼音检索键
// ==========================================
// 品类/商品/供应商/机构新建时写入 pinyin 列
// ==========================================

use pinyin::ToPinyin;

/// 名称转拼音检索键
///
/// 汉字取无声调拼音，拼音之间不加分隔，非汉字字符原样保留。
/// 名称不含汉字时返回 None。
pub fn pinyin_key(name: &str) -> Option<String> {
    let mut key = String::with_capacity(name.len() * 2);
    let mut has_han = false;
    for c in name.chars() {
        match c.to_pinyin() {
            Some(p) => {
                has_han = true;
                key.push_str(p.plain());
            }
            None => key.push(c),
        }
    }
    has_han.then_some(key)
}
