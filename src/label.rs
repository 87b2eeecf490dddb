//! Text shown on entity proxies.
use crate::identity::ObservedEntity;

/// Label of the sentinel anchor, where idle entities rest.
pub const NULL_SYSTEM_NAME: &str = "No System";

/// How to turn an [`ObservedEntity`] into a proxy label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelStyle {
    /// Show the entity's string form as is.
    Verbatim,
    /// Drop the `(*N)` retain count from the entity's string form.
    ///
    /// The retain count changes whenever something holds on to the entity,
    /// which would otherwise show up as a label change (and a log entry)
    /// without anything meaningful happening to the entity.
    #[default]
    StripRetainCount,
}

/// `"{context} {display}"`, with `display` shaped according to `style`.
pub fn entity_label(entity: &ObservedEntity, style: LabelStyle) -> String {
    let display = match style {
        LabelStyle::Verbatim => entity.display.clone(),
        LabelStyle::StripRetainCount => strip_retain_count(&entity.display),
    };
    format!("{} {display}", entity.key.context)
}

/// Remove the first `(*<digits>)` group of `display`.
fn strip_retain_count(display: &str) -> String {
    let mut search_from = 0;
    while let Some(offset) = display[search_from..].find("(*") {
        let start = search_from + offset;
        let digits_start = start + 2;
        let digits_len = display[digits_start..].bytes().take_while(u8::is_ascii_digit).count();
        let close = digits_start + digits_len;
        if digits_len > 0 && display[close..].starts_with(')') {
            let mut stripped = String::with_capacity(display.len());
            stripped.push_str(&display[..start]);
            stripped.push_str(&display[close + 1..]);
            return stripped;
        }
        search_from = digits_start;
    }
    display.to_owned()
}
