/// Evaluates `$block`, logs how long it took at debug level and yields the
/// block's value.
#[macro_export]
macro_rules! timer_debug {
    ($msg:literal, $block:expr) => {{
        let (result, elapsed) = $crate::timed!($block);
        tracing::debug!("{}: took {:?}", $msg, elapsed);
        result
    }};
}

/// Evaluates `$block` and yields `(value, elapsed)` where `elapsed` is a
/// `jiff::SignedDuration`.
#[macro_export]
macro_rules! timed {
    ($block:expr) => {{
        let now = jiff::Timestamp::now();
        let result = $block;
        (result, jiff::Timestamp::now().duration_since(now))
    }};
}
