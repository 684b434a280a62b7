//! Prompt Router
//!
//! Maps the pending input kind to the affordance the front end should offer.

use sentinel_core::InputKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAffordance {
    /// Single line, not echoed.
    Masked,
    /// Yes/no; answers are sent as literal `y` / `n`.
    YesNo,
    Plain,
}

impl InputAffordance {
    pub fn is_masked(&self) -> bool {
        matches!(self, InputAffordance::Masked)
    }
}

pub fn route(kind: InputKind) -> InputAffordance {
    match kind {
        InputKind::Password => InputAffordance::Masked,
        InputKind::Confirm => InputAffordance::YesNo,
        InputKind::None => InputAffordance::Plain,
    }
}

/// Route a raw `prompt_hint` value.
pub fn route_hint(hint: Option<&str>) -> InputAffordance {
    route(InputKind::from_hint(hint))
}

pub fn confirm_answer(yes: bool) -> &'static str {
    if yes { "y" } else { "n" }
}
