pub mod attendance_record;
pub mod class_session;
pub mod plan;
pub mod plan_course;
pub mod student;

pub use attendance_record::Entity as AttendanceRecord;
pub use class_session::Entity as ClassSession;
pub use plan::Entity as Plan;
pub use plan_course::Entity as PlanCourse;
pub use student::Entity as Student;
