pub mod cloud;
pub mod debug_script;
pub mod session_file;
