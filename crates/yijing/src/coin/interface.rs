/// A source of fair coin tosses.
///
/// Line casting only ever needs single fair bits, so this is the whole
/// abstraction. It lets you plug in the thread-local RNG in production or a
/// scripted sequence of tosses in tests.
///
/// `true` is a yang face (counts toward the yang total), `false` a yin face.
///
/// # Example
/// ```
/// use yijing::{CoinSource, Line, generate_line};
///
/// struct AlwaysYang;
/// impl CoinSource for AlwaysYang {
///     fn toss(&self) -> bool {
///         true
///     }
/// }
///
/// assert_eq!(generate_line(&AlwaysYang), Line::OldYang);
/// ```
pub trait CoinSource {
    /// Returns the face of one fair coin toss.
    fn toss(&self) -> bool;
}

impl<C: CoinSource + ?Sized> CoinSource for &C {
    fn toss(&self) -> bool {
        (**self).toss()
    }
}
