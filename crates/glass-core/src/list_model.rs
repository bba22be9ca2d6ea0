/// The cursor moved to `index`. Returned by every mutation that moves focus
/// so callers can fan the change out to whatever is bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusChange {
    pub index: usize,
}

/// Ordered rows plus a focus cursor. Growth is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListModel<T> {
    items: Vec<T>,
    focus: Option<usize>,
}

impl<T> Default for ListModel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            focus: None,
        }
    }
}

impl<T> ListModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn focused(&self) -> Option<&T> {
        self.focus.and_then(|index| self.items.get(index))
    }

    pub fn insert_at(&mut self, pos: usize, item: T) -> Option<FocusChange> {
        let pos = pos.min(self.items.len());
        self.items.insert(pos, item);
        self.focus = Some(pos);
        Some(FocusChange { index: pos })
    }

    pub fn insert_front(&mut self, item: T) -> Option<FocusChange> {
        self.insert_at(0, item)
    }

    /// Inserts a whole batch starting at `pos`, keeping the batch order, and
    /// focuses the last row of the batch with a single focus change.
    pub fn insert_batch_at<I>(&mut self, pos: usize, batch: I) -> Option<FocusChange>
    where
        I: IntoIterator<Item = T>,
    {
        let start = pos.min(self.items.len());
        let mut next = start;
        for item in batch {
            self.items.insert(next, item);
            next += 1;
        }
        if next == start {
            return None;
        }
        let index = next - 1;
        self.focus = Some(index);
        Some(FocusChange { index })
    }

    /// Inserts without taking the cursor away from the row it is on.
    pub fn insert_at_keep_focus(&mut self, pos: usize, item: T) -> Option<FocusChange> {
        let pos = pos.min(self.items.len());
        self.items.insert(pos, item);
        if let Some(focus) = self.focus {
            if pos <= focus {
                self.focus = Some(focus + 1);
            }
        }
        None
    }

    pub fn push_back(&mut self, item: T) -> Option<FocusChange> {
        let pos = self.items.len();
        self.insert_at(pos, item)
    }

    pub fn set_focus(&mut self, pos: usize) -> Option<FocusChange> {
        if pos >= self.items.len() || self.focus == Some(pos) {
            return None;
        }
        self.focus = Some(pos);
        Some(FocusChange { index: pos })
    }

    pub fn move_focus(&mut self, delta: isize) -> Option<FocusChange> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        let target = match self.focus {
            Some(current) => {
                if delta.is_negative() {
                    current.saturating_sub(delta.unsigned_abs())
                } else {
                    current.saturating_add(delta.unsigned_abs()).min(last)
                }
            }
            None => 0,
        };
        self.set_focus(target)
    }

    pub fn focus_first(&mut self) -> Option<FocusChange> {
        self.set_focus(0)
    }

    pub fn focus_last(&mut self) -> Option<FocusChange> {
        let last = self.items.len().checked_sub(1)?;
        self.set_focus(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_front_puts_newest_first_and_focuses_it() {
        for count in 1..=6usize {
            let mut model = ListModel::new();
            for value in 0..count {
                assert_eq!(model.insert_front(value), Some(FocusChange { index: 0 }));
            }
            assert_eq!(model.get(0), Some(&(count - 1)));
            assert_eq!(model.focus(), Some(0));
            assert_eq!(model.len(), count);
        }
    }

    #[test]
    fn batch_insert_keeps_order_and_reports_one_change() {
        let mut model = ListModel::new();
        model.push_back("old");
        let change = model.insert_batch_at(0, ["a", "b", "c"]);
        assert_eq!(change, Some(FocusChange { index: 2 }));
        assert_eq!(model.items(), ["a", "b", "c", "old"]);
        assert_eq!(model.focused(), Some(&"c"));

        assert_eq!(model.insert_batch_at(0, Vec::<&str>::new()), None);
        assert_eq!(model.focus(), Some(2));
    }

    #[test]
    fn keep_focus_insert_leaves_cursor_on_the_same_row() {
        let mut model = ListModel::new();
        model.push_back("first");
        model.push_back("second");
        model.set_focus(1);

        assert_eq!(model.insert_at_keep_focus(0, "newest"), None);
        assert_eq!(model.focused(), Some(&"second"));
        assert_eq!(model.get(0), Some(&"newest"));

        let mut empty = ListModel::new();
        empty.insert_at_keep_focus(0, "only");
        assert_eq!(empty.focus(), None);
    }

    #[test]
    fn push_back_follows_focus_to_the_end() {
        let mut model = ListModel::new();
        model.push_back(1);
        assert_eq!(model.push_back(2), Some(FocusChange { index: 1 }));
        assert_eq!(model.focused(), Some(&2));
    }

    #[test]
    fn focus_moves_clamp_and_report_only_real_changes() {
        let mut model = ListModel::new();
        assert_eq!(model.move_focus(1), None);
        assert_eq!(model.focus_last(), None);

        model.insert_batch_at(0, [10, 20, 30]);
        assert_eq!(model.focus(), Some(2));
        assert_eq!(model.move_focus(5), None);
        assert_eq!(model.move_focus(-1), Some(FocusChange { index: 1 }));
        assert_eq!(model.move_focus(-9), Some(FocusChange { index: 0 }));
        assert_eq!(model.focus_first(), None);
        assert_eq!(model.focus_last(), Some(FocusChange { index: 2 }));
        assert_eq!(model.set_focus(3), None);
    }

    #[test]
    fn out_of_range_insert_clamps_to_the_end() {
        let mut model = ListModel::new();
        model.push_back('a');
        assert_eq!(model.insert_at(9, 'b'), Some(FocusChange { index: 1 }));
        assert_eq!(model.items(), ['a', 'b']);
    }
}
