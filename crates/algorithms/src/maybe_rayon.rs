//! Parallel iteration when the `parallel` feature is on, plain iterators otherwise.
//!
//! Pixel loops and tree training are written against `into_par_iter()`;
//! without rayon the call resolves to `into_iter()` and the rest of the
//! chain (`map`, `flat_map`, `collect`) uses the standard `Iterator` methods.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
