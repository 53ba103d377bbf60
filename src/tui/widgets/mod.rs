pub mod dashboard;
pub mod subject_detail;
pub mod subjects;
