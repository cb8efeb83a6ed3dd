// ============================================================================
// spark-watch - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// # Usage
///
/// ```rust
/// use spark_watch::{cloned, computed, signal};
///
/// let a = signal(1);
/// let b = signal(2);
///
/// let sum = computed(cloned!(a, b => move || a.get() + b.get()));
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a computed value with automatic variable capturing.
///
/// # Usage
///
/// ```rust
/// use spark_watch::{computed, signal};
///
/// let a = signal(1);
/// let b = signal(2);
/// let sum = computed!(a, b => a.get() + b.get());
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! computed {
    ($($deps:ident),+ => $body:expr) => {
        $crate::computed($crate::cloned!($($deps),+ => move || $body))
    };
    ($body:expr) => {
        $crate::computed(move || $body)
    };
}

/// Watch an inline expression with automatic variable capturing.
///
/// Wraps `watch_fn(cloned!(... => move || ...), handler)`.
///
/// # Usage
///
/// ```rust
/// use spark_watch::{signal, watch};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let first = signal(String::from("Ada"));
/// let last = signal(String::from("Lovelace"));
/// let changes = Rc::new(Cell::new(0));
///
/// let c = changes.clone();
/// let _w = watch!(first, last => format!("{} {}", first.get(), last.get()),
///     move |_new: &String, _old: &String| c.set(c.get() + 1));
///
/// first.set(String::from("Augusta"));
/// assert_eq!(changes.get(), 1);
/// ```
#[macro_export]
macro_rules! watch {
    ($($deps:ident),+ => $body:expr, $handler:expr) => {
        $crate::watch_fn($crate::cloned!($($deps),+ => move || $body), $handler)
    };
}
