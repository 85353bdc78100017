//! Voice name mapping.
//!
//! Clients address voices by the realtime API's names (`alloy`, `echo`, ...) or by the
//! vendor's own identifiers. Both resolve through one static table; anything the table
//! does not know is handed to the vendor untouched.

use phf::phf_map;

/// Vendor voice used when neither the request nor the session names one.
pub const DEFAULT_VENDOR_VOICE: &str = "longxiaochun_v2";

/// Realtime API voice names and native vendor voices, keyed to the vendor identifier.
///
/// Native entries map to themselves so that a lookup can tell "known voice" apart from
/// "passed through".
static VOICE_TABLE: phf::Map<&'static str, &'static str> = phf_map! {
    // Realtime API aliases
    "alloy" => "longxiaochun_v2",
    "echo" => "longnan_v2",
    "fable" => "longmiao_v2",
    "onyx" => "longsanshu",
    "nova" => "longyue_v2",
    "shimmer" => "longyuan_v2",

    // Native vendor voices
    "longyumi_v2" => "longyumi_v2",
    "longxiaochun_v2" => "longxiaochun_v2",
    "longxiaoxia_v2" => "longxiaoxia_v2",
    "longsanshu" => "longsanshu",
    "longxiu_v2" => "longxiu_v2",
    "longmiao_v2" => "longmiao_v2",
    "longyue_v2" => "longyue_v2",
    "longnan_v2" => "longnan_v2",
    "longyuan_v2" => "longyuan_v2",
    "longanrou" => "longanrou",
    "longqiang_v2" => "longqiang_v2",
    "longhan_v2" => "longhan_v2",
    "longxing_v2" => "longxing_v2",
    "longhua_v2" => "longhua_v2",
    "longwan_v2" => "longwan_v2",
    "longcheng_v2" => "longcheng_v2",
    "longfeifei_v2" => "longfeifei_v2",
    "longxiaocheng_v2" => "longxiaocheng_v2",
    "longzhe_v2" => "longzhe_v2",
    "longyan_v2" => "longyan_v2",
    "longtian_v2" => "longtian_v2",
    "longze_v2" => "longze_v2",
    "longshao_v2" => "longshao_v2",
    "longhao_v2" => "longhao_v2",
    "longshu_v2" => "longshu_v2",
    "loongbella_v2" => "loongbella_v2",
    "longshuo_v2" => "longshuo_v2",
    "longxiaobai_v2" => "longxiaobai_v2",
    "longjing_v2" => "longjing_v2",
    "loongstella_v2" => "loongstella_v2",
};

/// Map a client voice name to the vendor voice identifier.
///
/// Unknown names pass through unchanged; this never fails.
pub fn map_voice(name: &str) -> &str {
    VOICE_TABLE.get(name).copied().unwrap_or(name)
}

/// Resolve an optional voice to the identifier sent to the vendor.
///
/// Empty or absent names fall back to [`DEFAULT_VENDOR_VOICE`].
pub fn resolve_voice(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(voice) if !voice.is_empty() => map_voice(voice).to_string(),
        _ => DEFAULT_VENDOR_VOICE.to_string(),
    }
}

/// Whether the table has an explicit entry for this name.
pub fn is_known_voice(name: &str) -> bool {
    VOICE_TABLE.contains_key(name)
}
