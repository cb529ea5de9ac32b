use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
};

use biomero_core::tree_view::{TreeView, TreeViewRenderConfig, render_tree_view};
use biomero_core::ui::render_hints;

use crate::Pane;

/// Files on the left, OMERO destinations on the right.
pub fn render_upload(
    frame: &mut Frame,
    area: Rect,
    files: &TreeView,
    omero: &TreeView,
    pane: Pane,
    importing: bool,
) {
    let [body_area, hint_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(area);
    let [files_area, omero_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(body_area);

    render_tree_view(
        frame,
        files_area,
        files,
        &TreeViewRenderConfig {
            title: "Files to import",
            focused: pane == Pane::Files,
            checkboxes: true,
        },
    );
    render_tree_view(
        frame,
        omero_area,
        omero,
        &TreeViewRenderConfig {
            title: "Destination",
            focused: pane == Pane::Destination,
            checkboxes: true,
        },
    );

    let hints = if importing {
        "Queueing import..."
    } else {
        "C-h/C-l:pane  l/h:expand  x:select  X/U:all  s:import  R:reload"
    };
    render_hints(frame, hint_area, hints);
}
