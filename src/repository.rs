use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Course, CourseForm, Entity, Id, Instructor, InstructorForm, Registration, RegistrationFields,
    Section, SectionFields, Semester, SemesterFields, Student, StudentForm, User,
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// RepoError
///
/// Storage failures. Constraint violations are surfaced as their own variants so the
/// controller can turn them into form errors or delete refusals instead of a 500.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },
    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: String },
    /// A row references a record that cannot be loaded.
    #[error("{entity} {id} is referenced but missing")]
    MissingReference { entity: Entity, id: Id },
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().unwrap_or_default().to_string();
            if db.is_unique_violation() {
                return RepoError::UniqueViolation { constraint };
            }
            if db.is_foreign_key_violation() {
                return RepoError::ForeignKeyViolation { constraint };
            }
        }
        RepoError::Database(err)
    }
}

/// Window
///
/// A `LIMIT`/`OFFSET` slice of an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: i64,
    pub offset: i64,
}

/// Repository Trait
///
/// The data-access contract for the catalog. Handlers never see a connection: they
/// hold an `Arc<dyn Repository>` and each implementation owns its own handle
/// (a `PgPool` for Postgres, a mutex-guarded table set in memory).
///
/// Listing order: courses by number then name, every other entity by primary key.
/// Deletes never cascade; a delete blocked by a dependent row fails with
/// `RepoError::ForeignKeyViolation`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    // Permission codenames granted directly to the user (`courseinfo.view_course`).
    async fn get_user_permissions(&self, id: Uuid) -> Result<Vec<String>, RepoError>;

    // --- Shared ---
    async fn count(&self, entity: Entity) -> Result<i64, RepoError>;
    // Returns false when no row had that id.
    async fn delete(&self, entity: Entity, id: Id) -> Result<bool, RepoError>;

    // --- Instructors ---
    async fn list_instructors(&self, window: Option<Window>) -> Result<Vec<Instructor>, RepoError>;
    async fn get_instructor(&self, id: Id) -> Result<Option<Instructor>, RepoError>;
    async fn insert_instructor(&self, fields: &InstructorForm) -> Result<Instructor, RepoError>;
    async fn update_instructor(
        &self,
        id: Id,
        fields: &InstructorForm,
    ) -> Result<Option<Instructor>, RepoError>;

    // --- Courses ---
    async fn list_courses(&self, window: Option<Window>) -> Result<Vec<Course>, RepoError>;
    async fn get_course(&self, id: Id) -> Result<Option<Course>, RepoError>;
    async fn insert_course(&self, fields: &CourseForm) -> Result<Course, RepoError>;
    async fn update_course(&self, id: Id, fields: &CourseForm) -> Result<Option<Course>, RepoError>;

    // --- Semesters ---
    async fn list_semesters(&self, window: Option<Window>) -> Result<Vec<Semester>, RepoError>;
    async fn get_semester(&self, id: Id) -> Result<Option<Semester>, RepoError>;
    async fn insert_semester(&self, fields: &SemesterFields) -> Result<Semester, RepoError>;
    async fn update_semester(
        &self,
        id: Id,
        fields: &SemesterFields,
    ) -> Result<Option<Semester>, RepoError>;

    // --- Sections ---
    async fn list_sections(&self, window: Option<Window>) -> Result<Vec<Section>, RepoError>;
    async fn get_section(&self, id: Id) -> Result<Option<Section>, RepoError>;
    async fn insert_section(&self, fields: &SectionFields) -> Result<Section, RepoError>;
    async fn update_section(
        &self,
        id: Id,
        fields: &SectionFields,
    ) -> Result<Option<Section>, RepoError>;

    // --- Students ---
    async fn list_students(&self, window: Option<Window>) -> Result<Vec<Student>, RepoError>;
    async fn get_student(&self, id: Id) -> Result<Option<Student>, RepoError>;
    async fn insert_student(&self, fields: &StudentForm) -> Result<Student, RepoError>;
    async fn update_student(&self, id: Id, fields: &StudentForm) -> Result<Option<Student>, RepoError>;

    // --- Registrations ---
    async fn list_registrations(
        &self,
        window: Option<Window>,
    ) -> Result<Vec<Registration>, RepoError>;
    async fn get_registration(&self, id: Id) -> Result<Option<Registration>, RepoError>;
    async fn insert_registration(
        &self,
        fields: &RegistrationFields,
    ) -> Result<Registration, RepoError>;
    async fn update_registration(
        &self,
        id: Id,
        fields: &RegistrationFields,
    ) -> Result<Option<Registration>, RepoError>;

    // --- Dependents (live queries, ordered by primary key) ---
    async fn sections_for_instructor(&self, instructor_id: Id) -> Result<Vec<Section>, RepoError>;
    async fn sections_for_course(&self, course_id: Id) -> Result<Vec<Section>, RepoError>;
    async fn sections_for_semester(&self, semester_id: Id) -> Result<Vec<Section>, RepoError>;
    async fn registrations_for_section(&self, section_id: Id) -> Result<Vec<Registration>, RepoError>;
    async fn registrations_for_student(&self, student_id: Id) -> Result<Vec<Registration>, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
