pub mod clock;
pub mod html;
pub mod panic;
pub mod time;
