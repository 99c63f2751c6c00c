//! Call models for the small allow-list of forwarding helpers.
//!
//! Everything else user-defined is opaque: calls conjure unknown results
//! and invalidate non-local state.

/// The non-nullable wrapper's qualified name, matched exactly.
pub const NOT_NULL_QUALIFIED_NAME: &str = "gsl::not_null";
/// Factory yielding a wrapper from a raw pointer, checked at call site.
pub const MAKE_NOT_NULL_QUALIFIED_NAME: &str = "gsl::make_not_null";
pub const STD_FORWARD_QUALIFIED_NAME: &str = "std::forward";
pub const STD_MOVE_QUALIFIED_NAME: &str = "std::move";
pub const STD_ADDRESSOF_QUALIFIED_NAME: &str = "std::addressof";

/// How a modeled call is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallModel {
    /// Returns its argument unchanged, preserving the null constraint;
    /// triggers no invalidation.
    Identity,
    /// Returns the address of its argument lvalue; always not-null.
    AddressOf,
    /// Builds the non-nullable wrapper from a raw pointer, reporting if
    /// the argument is not provably non-null.
    MakeNotNull,
}

pub fn call_model(callee: &str) -> Option<CallModel> {
    match callee {
        STD_FORWARD_QUALIFIED_NAME | STD_MOVE_QUALIFIED_NAME => Some(CallModel::Identity),
        STD_ADDRESSOF_QUALIFIED_NAME => Some(CallModel::AddressOf),
        MAKE_NOT_NULL_QUALIFIED_NAME => Some(CallModel::MakeNotNull),
        _ => None,
    }
}

/// Modeled calls neither escape their arguments nor invalidate state.
pub fn is_modeled(callee: &str) -> bool {
    call_model(callee).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert_eq!(call_model("std::move"), Some(CallModel::Identity));
        assert_eq!(call_model("std::forward"), Some(CallModel::Identity));
        assert_eq!(call_model("std::addressof"), Some(CallModel::AddressOf));
        assert_eq!(
            call_model("gsl::make_not_null"),
            Some(CallModel::MakeNotNull)
        );
        assert_eq!(call_model("do_something"), None);
    }

    #[test]
    fn test_exact_match_only() {
        assert!(!is_modeled("std::move_backward"));
        assert!(!is_modeled("my::std::move"));
    }
}
