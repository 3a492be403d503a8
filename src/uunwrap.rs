//! Unwrapping for lookups that cannot fail, e.g. re-reading a bucket index the
//! table just returned. Keeps the panic path out of line.

pub trait UUnwrap {
    type Inner;
    fn uunwrap(self) -> Self::Inner;
}

impl<T> UUnwrap for Option<T> {
    type Inner = T;
    #[inline(always)]
    fn uunwrap(self) -> Self::Inner {
        match self {
            Some(v) => v,
            None => bang(),
        }
    }
}

#[cold]
#[inline(never)]
fn bang() -> ! {
    panic!("compact table lost track of a bucket it just returned")
}
