// Models module - Database entity representations

pub mod attendance;
pub mod session;
pub mod student;

/// Column widths of the VARCHAR columns, in characters
pub const STUDENT_ID_MAX_LEN: usize = 50;
pub const CLASS_MAX_LEN: usize = 50;
pub const NAME_MAX_LEN: usize = 255;
pub const SUBJECT_MAX_LEN: usize = 255;
pub const TEACHER_ID_MAX_LEN: usize = 100;

pub fn fits(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}

pub use attendance::{Attendance, AttendanceStatus, SessionAttendance, StudentAttendance};
pub use session::Session;
pub use student::Student;
