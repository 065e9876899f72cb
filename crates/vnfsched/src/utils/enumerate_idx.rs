use std::marker::PhantomData;

/// Like [`Iterator::enumerate`], but yields a typed index instead of `usize`.
pub struct EnumerateIdx<I, Idx> {
    inner: std::iter::Enumerate<I>,
    _idx: PhantomData<Idx>,
}

pub trait IntoEnumerateIdx: Iterator + Sized {
    fn enumerate_idx<Idx: From<usize>>(self) -> EnumerateIdx<Self, Idx> {
        EnumerateIdx {
            inner: self.enumerate(),
            _idx: PhantomData,
        }
    }
}

impl<I: Iterator> IntoEnumerateIdx for I {}

impl<I: Iterator, Idx: From<usize>> Iterator for EnumerateIdx<I, Idx> {
    type Item = (Idx, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let (index, item) = self.inner.next()?;
        Some((Idx::from(index), item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<I: ExactSizeIterator, Idx: From<usize>> ExactSizeIterator for EnumerateIdx<I, Idx> {}
