//! Ordered image list with a selection.

use crate::images::{ImageId, ImageRef};

/// Images open in a window, in display order.
///
/// Selection is a sorted set of positions; the first selected image is
/// the one the window displays.
#[derive(Debug, Default)]
pub struct Gallery {
    images: Vec<ImageRef>,
    selected: Vec<usize>,
}

impl Gallery {
    pub fn new(images: Vec<ImageRef>) -> Self {
        Self {
            images,
            selected: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImageRef> {
        self.images.get(index)
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn position_of(&self, id: ImageId) -> Option<usize> {
        self.images.iter().position(|image| image.id() == id)
    }

    pub fn selected_positions(&self) -> &[usize] {
        &self.selected
    }

    pub fn selected_images(&self) -> Vec<ImageRef> {
        self.selected
            .iter()
            .filter_map(|&i| self.images.get(i).cloned())
            .collect()
    }

    pub fn n_selected(&self) -> usize {
        self.selected.len()
    }

    pub fn first_selected(&self) -> Option<&ImageRef> {
        self.selected.first().and_then(|&i| self.images.get(i))
    }

    pub fn first_selected_position(&self) -> Option<usize> {
        self.selected.first().copied()
    }

    /// Replace the selection with `index`. Out-of-range clears it.
    pub fn select_single(&mut self, index: usize) {
        self.selected.clear();
        if index < self.images.len() {
            self.selected.push(index);
        }
    }

    /// Replace the selection. Out-of-range and duplicate positions are dropped.
    pub fn set_selection(&mut self, mut positions: Vec<usize>) {
        positions.retain(|&i| i < self.images.len());
        positions.sort_unstable();
        positions.dedup();
        self.selected = positions;
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Position after the first selected one. Wraps when `wrap` is set.
    pub fn next_position(&self, wrap: bool) -> Option<usize> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        match self.first_selected_position() {
            None => Some(0),
            Some(i) if i + 1 < len => Some(i + 1),
            Some(_) if wrap => Some(0),
            Some(_) => None,
        }
    }

    /// Position before the first selected one. Wraps when `wrap` is set.
    pub fn previous_position(&self, wrap: bool) -> Option<usize> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        match self.first_selected_position() {
            None => Some(len - 1),
            Some(i) if i > 0 => Some(i - 1),
            Some(_) if wrap => Some(len - 1),
            Some(_) => None,
        }
    }

    pub fn push(&mut self, image: ImageRef) {
        self.images.push(image);
    }

    /// Remove an image, keeping selection positions consistent.
    pub fn remove(&mut self, id: ImageId) -> Option<ImageRef> {
        let index = self.position_of(id)?;
        let removed = self.images.remove(index);
        self.selected = self
            .selected
            .iter()
            .filter(|&&i| i != index)
            .map(|&i| if i > index { i - 1 } else { i })
            .collect();
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::testing::FakeImage;

    fn gallery(n: usize) -> Gallery {
        Gallery::new(
            (0..n)
                .map(|i| FakeImage::new(&format!("{i}.png")) as ImageRef)
                .collect(),
        )
    }

    #[test]
    fn selection_is_sorted_and_bounded() {
        let mut g = gallery(3);
        g.set_selection(vec![2, 0, 7, 2]);
        assert_eq!(g.selected_positions(), &[0, 2]);
        assert_eq!(g.first_selected().unwrap().caption(), "0.png");

        g.select_single(5);
        assert_eq!(g.n_selected(), 0);
    }

    #[test]
    fn navigation_wraps_only_when_asked() {
        let mut g = gallery(3);
        g.select_single(2);
        assert_eq!(g.next_position(false), None);
        assert_eq!(g.next_position(true), Some(0));

        g.select_single(0);
        assert_eq!(g.previous_position(false), None);
        assert_eq!(g.previous_position(true), Some(2));

        assert_eq!(gallery(0).next_position(true), None);
    }

    #[test]
    fn remove_shifts_selection() {
        let mut g = gallery(4);
        g.set_selection(vec![1, 3]);
        let id = g.get(1).unwrap().id();

        let removed = g.remove(id).unwrap();
        assert_eq!(removed.caption(), "1.png");
        assert_eq!(g.len(), 3);
        assert_eq!(g.selected_positions(), &[2]);
        assert_eq!(g.first_selected().unwrap().caption(), "3.png");
    }
}
