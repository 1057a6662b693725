pub mod attendance;
pub mod calendar;
pub mod core;
pub mod reports;
pub mod students;
pub mod users;
pub mod years;
