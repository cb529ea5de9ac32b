pub mod db;
pub mod help_popup;
pub mod history;
pub mod keybinds;
pub mod menu_filter;
pub mod selection;
pub mod store;
pub mod telescope;
pub mod tool;
pub mod tree_view;
pub mod ui;
pub mod which_key;
