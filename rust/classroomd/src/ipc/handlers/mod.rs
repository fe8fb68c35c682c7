pub mod behavior;
pub mod core;
pub mod dashboard;
pub mod records;
pub mod seating;
