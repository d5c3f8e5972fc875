use crate::splitable_span::SplitableSpan;

/// Push items onto a `Vec`-like container, merging into the last entry instead of
/// allocating a new one whenever `can_append` allows it.
pub trait AppendRLE<T: SplitableSpan> {
    fn push_rle(&mut self, item: T);
    fn push_reversed_rle(&mut self, item: T);
}

impl<T: SplitableSpan> AppendRLE<T> for Vec<T> {
    fn push_rle(&mut self, item: T) {
        if let Some(v) = self.last_mut() {
            if v.can_append(&item) {
                v.append(item);
                return;
            }
        }

        self.push(item);
    }

    fn push_reversed_rle(&mut self, item: T) {
        if let Some(v) = self.last_mut() {
            if item.can_append(v) {
                v.prepend(item);
                return;
            }
        }

        self.push(item);
    }
}
