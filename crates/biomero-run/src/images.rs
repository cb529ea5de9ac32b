use std::collections::HashSet;

use biomero_core::keybinds::LineInput;
use biomero_core::menu_filter::contains_ignore_case;
use biomero_core::store::{NodeId, NodeStore, entity_id};

/// An image of one of the input datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub id: i64,
    pub name: String,
    pub dataset: NodeId,
}

/// Images of the chosen datasets with a filename filter and a checked set.
#[derive(Debug, Clone, Default)]
pub struct ImagePicker {
    images: Vec<ImageEntry>,
    filtered: Vec<usize>,
    selected: HashSet<i64>,
    thumbnails: HashSet<i64>,
    pub filter: LineInput,
    pub cursor: usize,
}

impl ImagePicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images loaded under the given dataset nodes, in dataset order.
    pub fn collect_images(store: &NodeStore, datasets: &[NodeId]) -> Vec<ImageEntry> {
        datasets
            .iter()
            .flat_map(|dataset| {
                store.children_of(dataset).into_iter().filter_map(move |node| {
                    Some(ImageEntry {
                        id: entity_id(&node.id)?,
                        name: node.label.clone(),
                        dataset: dataset.clone(),
                    })
                })
            })
            .collect()
    }

    /// Replace the image list. Images seen for the first time start checked;
    /// checks on images that are gone are dropped. Returns the new ids.
    pub fn set_images(&mut self, images: Vec<ImageEntry>) -> Vec<i64> {
        let known: HashSet<i64> = self.images.iter().map(|i| i.id).collect();
        let present: HashSet<i64> = images.iter().map(|i| i.id).collect();
        let fresh: Vec<i64> = images
            .iter()
            .map(|i| i.id)
            .filter(|id| !known.contains(id))
            .collect();

        self.selected.retain(|id| present.contains(id));
        self.selected.extend(fresh.iter().copied());
        self.images = images;
        self.apply_filter();
        fresh
    }

    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    pub fn visible(&self) -> impl Iterator<Item = &ImageEntry> {
        self.filtered.iter().filter_map(|&i| self.images.get(i))
    }

    pub fn visible_len(&self) -> usize {
        self.filtered.len()
    }

    /// Recompute the filtered list from the current filter text.
    pub fn apply_filter(&mut self) {
        let query = self.filter.text.trim();
        self.filtered = self
            .images
            .iter()
            .enumerate()
            .filter(|(_, img)| query.is_empty() || contains_ignore_case(&img.name, query))
            .map(|(i, _)| i)
            .collect();
        if self.cursor >= self.filtered.len() {
            self.cursor = self.filtered.len().saturating_sub(1);
        }
    }

    pub fn current(&self) -> Option<&ImageEntry> {
        self.filtered
            .get(self.cursor)
            .and_then(|&i| self.images.get(i))
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.filtered.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    pub fn toggle_current(&mut self) {
        if let Some(id) = self.current().map(|i| i.id) {
            if !self.selected.remove(&id) {
                self.selected.insert(id);
            }
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.images.iter().map(|i| i.id).collect();
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    pub fn select_filtered(&mut self) {
        let ids: Vec<i64> = self.visible().map(|i| i.id).collect();
        self.selected.extend(ids);
    }

    pub fn deselect_filtered(&mut self) {
        let ids: HashSet<i64> = self.visible().map(|i| i.id).collect();
        self.selected.retain(|id| !ids.contains(id));
    }

    /// Checked image ids in list order.
    pub fn selected_ids(&self) -> Vec<i64> {
        self.images
            .iter()
            .map(|i| i.id)
            .filter(|id| self.selected.contains(id))
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn mark_thumbnails(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.thumbnails.extend(ids);
    }

    pub fn has_thumbnail(&self, id: i64) -> bool {
        self.thumbnails.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomero_core::store::{ChildRecord, NodeCategory};

    fn image(id: i64, name: &str) -> ImageEntry {
        ImageEntry {
            id,
            name: name.to_string(),
            dataset: "dataset-1".to_string(),
        }
    }

    fn picker() -> ImagePicker {
        let mut picker = ImagePicker::new();
        picker.set_images(vec![
            image(1, "cells_01.tif"),
            image(2, "cells_02.tif"),
            image(3, "nuclei_01.tif"),
        ]);
        picker
    }

    #[test]
    fn test_new_images_start_checked() {
        let mut picker = picker();
        assert_eq!(picker.selected_ids(), vec![1, 2, 3]);

        picker.deselect_all();
        let fresh = picker.set_images(vec![image(2, "cells_02.tif"), image(4, "extra.tif")]);
        assert_eq!(fresh, vec![4]);
        assert_eq!(picker.selected_ids(), vec![4], "known images keep their state");
    }

    #[test]
    fn test_filtered_selection() {
        let mut picker = picker();
        picker.filter = LineInput::with_text("CELLS");
        picker.apply_filter();
        assert_eq!(picker.visible_len(), 2);

        picker.deselect_filtered();
        assert_eq!(picker.selected_ids(), vec![3]);

        picker.deselect_all();
        picker.select_filtered();
        assert_eq!(picker.selected_ids(), vec![1, 2]);

        picker.filter.clear();
        picker.apply_filter();
        picker.select_all();
        assert_eq!(picker.selected_count(), 3);
    }

    #[test]
    fn test_toggle_and_cursor_clamp() {
        let mut picker = picker();
        picker.move_down();
        picker.move_down();
        picker.toggle_current();
        assert!(!picker.is_selected(3));

        picker.filter = LineInput::with_text("cells_01");
        picker.apply_filter();
        assert_eq!(picker.cursor, 0);
        assert_eq!(picker.current().map(|i| i.id), Some(1));
    }

    #[test]
    fn test_collect_images_from_store() {
        let mut store = NodeStore::new("OMERO");
        store.merge(
            "root",
            vec![ChildRecord::leaf("dataset-1", "DS1").with_category(NodeCategory::Datasets)],
        );
        store.merge(
            "dataset-1",
            vec![
                ChildRecord::leaf("image-10", "a.tif"),
                ChildRecord::leaf("image-11", "b.tif"),
            ],
        );
        let images = ImagePicker::collect_images(&store, &["dataset-1".to_string()]);
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].id, 11);
        assert!(ImagePicker::collect_images(&store, &["dataset-9".to_string()]).is_empty());
    }
}
