pub mod chat_view;
pub mod listings;
pub mod login;
pub mod main_window;
pub mod sidebar;
