// ============================================================================
// spark-watch - Equality Functions
// Decide whether a write or a re-evaluation counts as a change
// ============================================================================
//
// A signal write that compares equal sends no notification, and a computed
// whose new value compares equal keeps its version, so watches downstream
// stay quiet. Picking the equality function is how callers choose between
// "fire on real changes" and "fire on every write".
// ============================================================================

use crate::core::types::EqualsFn;

/// Strict equality using PartialEq. The default for signals and computeds.
///
/// # Example
/// ```
/// use spark_watch::reactivity::equality::equals;
///
/// assert!(equals(&42, &42));
/// assert!(!equals(&"a", &"b"));
/// ```
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Never equal: every write is a change. Backs `mutable_source`.
///
/// # Example
/// ```
/// use spark_watch::reactivity::equality::never_equals;
///
/// assert!(!never_equals(&42, &42));
/// ```
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

/// Always equal: writes are swallowed and nothing downstream ever fires.
pub fn always_equals<T>(_a: &T, _b: &T) -> bool {
    true
}

/// f64 equality where NaN equals NaN, so re-writing NaN is not a change.
///
/// # Example
/// ```
/// use spark_watch::reactivity::equality::safe_equals_f64;
///
/// assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
/// assert!(!safe_equals_f64(&f64::NAN, &1.0));
/// assert!(safe_equals_f64(&1.0, &1.0));
/// ```
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// f32 equality where NaN equals NaN.
pub fn safe_equals_f32(a: &f32, b: &f32) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

/// The never-equals function as an `EqualsFn<T>`.
pub fn never_equals_fn<T: 'static>() -> EqualsFn<T> {
    never_equals
}
