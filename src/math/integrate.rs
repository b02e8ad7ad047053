//! Numerical integration over a closed interval.

/// Number of Simpson panels used for yield integrals.
pub const SIMPSON_PANELS: usize = 400;

/// Composite Simpson rule of `f` over `[a, b]` with `panels` sub-intervals.
///
/// `panels` is rounded up to the next even number. Returns 0 for an empty or
/// reversed interval.
pub fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, panels: usize) -> f64 {
    if !(b > a) {
        return 0.0;
    }
    let n = (panels.max(2) + 1) & !1;
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}
