use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RepoError, Repository, Window};
use crate::models::{
    Course, CourseForm, Entity, Id, Instructor, InstructorForm, Registration, RegistrationFields,
    Section, SectionFields, Semester, SemesterFields, Student, StudentForm, User,
};

const INSTRUCTOR_COLUMNS: &str = "instructor_id, first_name, last_name, disambiguator";
const COURSE_COLUMNS: &str = "course_id, course_number, course_name";
const SEMESTER_COLUMNS: &str = "semester_id, year, term";
const SECTION_COLUMNS: &str = "section_id, section_name, semester_id, course_id, instructor_id";
const STUDENT_COLUMNS: &str = "student_id, first_name, last_name, nickname, disambiguator";
const REGISTRATION_COLUMNS: &str = "registration_id, section_id, student_id";

/// `LIMIT NULL` is "no limit" in Postgres, so an absent window binds as NULL/0.
fn limit_offset(window: Option<Window>) -> (Option<i64>, i64) {
    match window {
        Some(w) => (Some(w.limit), w.offset),
        None => (None, 0),
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// All queries are parameterized; table and column names come from fixed constants.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_page<T>(
        &self,
        columns: &str,
        entity: Entity,
        order_by: &str,
        window: Option<Window>,
    ) -> Result<Vec<T>, RepoError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
            columns,
            entity.table(),
            order_by
        );
        let (limit, offset) = limit_offset(window);
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_by_id<T>(&self, columns: &str, entity: Entity, id: Id) -> Result<Option<T>, RepoError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            columns,
            entity.table(),
            entity.primary_key()
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn fetch_children<T>(
        &self,
        columns: &str,
        entity: Entity,
        foreign_key: &str,
        parent_id: Id,
    ) -> Result<Vec<T>, RepoError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY {}",
            columns,
            entity.table(),
            foreign_key,
            entity.primary_key()
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// Retrieves the identity record used to resolve an authenticated caller.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, is_active, is_superuser FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_permissions(&self, id: Uuid) -> Result<Vec<String>, RepoError> {
        let codenames = sqlx::query_scalar::<_, String>(
            "SELECT codename FROM user_permissions WHERE user_id = $1 ORDER BY codename",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(codenames)
    }

    async fn count(&self, entity: Entity) -> Result<i64, RepoError> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        let total = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// delete
    ///
    /// Plain delete by primary key. Foreign keys are `ON DELETE RESTRICT`, so a row that
    /// gained a dependent after the guard ran fails here with a foreign-key violation.
    async fn delete(&self, entity: Entity, id: Id) -> Result<bool, RepoError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            entity.table(),
            entity.primary_key()
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --- INSTRUCTORS ---

    async fn list_instructors(&self, window: Option<Window>) -> Result<Vec<Instructor>, RepoError> {
        self.fetch_page(INSTRUCTOR_COLUMNS, Entity::Instructor, "instructor_id", window)
            .await
    }

    async fn get_instructor(&self, id: Id) -> Result<Option<Instructor>, RepoError> {
        self.fetch_by_id(INSTRUCTOR_COLUMNS, Entity::Instructor, id).await
    }

    async fn insert_instructor(&self, fields: &InstructorForm) -> Result<Instructor, RepoError> {
        let instructor = sqlx::query_as::<_, Instructor>(
            r#"INSERT INTO instructors (first_name, last_name, disambiguator)
               VALUES ($1, $2, $3)
               RETURNING instructor_id, first_name, last_name, disambiguator"#,
        )
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.disambiguator)
        .fetch_one(&self.pool)
        .await?;
        Ok(instructor)
    }

    async fn update_instructor(
        &self,
        id: Id,
        fields: &InstructorForm,
    ) -> Result<Option<Instructor>, RepoError> {
        let instructor = sqlx::query_as::<_, Instructor>(
            r#"UPDATE instructors
               SET first_name = $2, last_name = $3, disambiguator = $4
               WHERE instructor_id = $1
               RETURNING instructor_id, first_name, last_name, disambiguator"#,
        )
        .bind(id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.disambiguator)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instructor)
    }

    // --- COURSES ---

    /// list_courses
    ///
    /// Courses are the one entity with a declared default ordering: number, then name.
    async fn list_courses(&self, window: Option<Window>) -> Result<Vec<Course>, RepoError> {
        self.fetch_page(
            COURSE_COLUMNS,
            Entity::Course,
            "course_number, course_name, course_id",
            window,
        )
        .await
    }

    async fn get_course(&self, id: Id) -> Result<Option<Course>, RepoError> {
        self.fetch_by_id(COURSE_COLUMNS, Entity::Course, id).await
    }

    async fn insert_course(&self, fields: &CourseForm) -> Result<Course, RepoError> {
        let course = sqlx::query_as::<_, Course>(
            r#"INSERT INTO courses (course_number, course_name)
               VALUES ($1, $2)
               RETURNING course_id, course_number, course_name"#,
        )
        .bind(&fields.course_number)
        .bind(&fields.course_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(course)
    }

    async fn update_course(&self, id: Id, fields: &CourseForm) -> Result<Option<Course>, RepoError> {
        let course = sqlx::query_as::<_, Course>(
            r#"UPDATE courses SET course_number = $2, course_name = $3
               WHERE course_id = $1
               RETURNING course_id, course_number, course_name"#,
        )
        .bind(id)
        .bind(&fields.course_number)
        .bind(&fields.course_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    // --- SEMESTERS ---

    async fn list_semesters(&self, window: Option<Window>) -> Result<Vec<Semester>, RepoError> {
        self.fetch_page(SEMESTER_COLUMNS, Entity::Semester, "semester_id", window)
            .await
    }

    async fn get_semester(&self, id: Id) -> Result<Option<Semester>, RepoError> {
        self.fetch_by_id(SEMESTER_COLUMNS, Entity::Semester, id).await
    }

    async fn insert_semester(&self, fields: &SemesterFields) -> Result<Semester, RepoError> {
        let semester = sqlx::query_as::<_, Semester>(
            r#"INSERT INTO semesters (year, term) VALUES ($1, $2)
               RETURNING semester_id, year, term"#,
        )
        .bind(fields.year)
        .bind(&fields.term)
        .fetch_one(&self.pool)
        .await?;
        Ok(semester)
    }

    async fn update_semester(
        &self,
        id: Id,
        fields: &SemesterFields,
    ) -> Result<Option<Semester>, RepoError> {
        let semester = sqlx::query_as::<_, Semester>(
            r#"UPDATE semesters SET year = $2, term = $3
               WHERE semester_id = $1
               RETURNING semester_id, year, term"#,
        )
        .bind(id)
        .bind(fields.year)
        .bind(&fields.term)
        .fetch_optional(&self.pool)
        .await?;
        Ok(semester)
    }

    // --- SECTIONS ---

    async fn list_sections(&self, window: Option<Window>) -> Result<Vec<Section>, RepoError> {
        self.fetch_page(SECTION_COLUMNS, Entity::Section, "section_id", window)
            .await
    }

    async fn get_section(&self, id: Id) -> Result<Option<Section>, RepoError> {
        self.fetch_by_id(SECTION_COLUMNS, Entity::Section, id).await
    }

    async fn insert_section(&self, fields: &SectionFields) -> Result<Section, RepoError> {
        let section = sqlx::query_as::<_, Section>(
            r#"INSERT INTO sections (section_name, semester_id, course_id, instructor_id)
               VALUES ($1, $2, $3, $4)
               RETURNING section_id, section_name, semester_id, course_id, instructor_id"#,
        )
        .bind(&fields.section_name)
        .bind(fields.semester_id)
        .bind(fields.course_id)
        .bind(fields.instructor_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(section)
    }

    async fn update_section(
        &self,
        id: Id,
        fields: &SectionFields,
    ) -> Result<Option<Section>, RepoError> {
        let section = sqlx::query_as::<_, Section>(
            r#"UPDATE sections
               SET section_name = $2, semester_id = $3, course_id = $4, instructor_id = $5
               WHERE section_id = $1
               RETURNING section_id, section_name, semester_id, course_id, instructor_id"#,
        )
        .bind(id)
        .bind(&fields.section_name)
        .bind(fields.semester_id)
        .bind(fields.course_id)
        .bind(fields.instructor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(section)
    }

    // --- STUDENTS ---

    async fn list_students(&self, window: Option<Window>) -> Result<Vec<Student>, RepoError> {
        self.fetch_page(STUDENT_COLUMNS, Entity::Student, "student_id", window)
            .await
    }

    async fn get_student(&self, id: Id) -> Result<Option<Student>, RepoError> {
        self.fetch_by_id(STUDENT_COLUMNS, Entity::Student, id).await
    }

    async fn insert_student(&self, fields: &StudentForm) -> Result<Student, RepoError> {
        let student = sqlx::query_as::<_, Student>(
            r#"INSERT INTO students (first_name, last_name, nickname, disambiguator)
               VALUES ($1, $2, $3, $4)
               RETURNING student_id, first_name, last_name, nickname, disambiguator"#,
        )
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.nickname)
        .bind(&fields.disambiguator)
        .fetch_one(&self.pool)
        .await?;
        Ok(student)
    }

    async fn update_student(&self, id: Id, fields: &StudentForm) -> Result<Option<Student>, RepoError> {
        let student = sqlx::query_as::<_, Student>(
            r#"UPDATE students
               SET first_name = $2, last_name = $3, nickname = $4, disambiguator = $5
               WHERE student_id = $1
               RETURNING student_id, first_name, last_name, nickname, disambiguator"#,
        )
        .bind(id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.nickname)
        .bind(&fields.disambiguator)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    // --- REGISTRATIONS ---

    async fn list_registrations(
        &self,
        window: Option<Window>,
    ) -> Result<Vec<Registration>, RepoError> {
        self.fetch_page(REGISTRATION_COLUMNS, Entity::Registration, "registration_id", window)
            .await
    }

    async fn get_registration(&self, id: Id) -> Result<Option<Registration>, RepoError> {
        self.fetch_by_id(REGISTRATION_COLUMNS, Entity::Registration, id)
            .await
    }

    async fn insert_registration(
        &self,
        fields: &RegistrationFields,
    ) -> Result<Registration, RepoError> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"INSERT INTO registrations (section_id, student_id) VALUES ($1, $2)
               RETURNING registration_id, section_id, student_id"#,
        )
        .bind(fields.section_id)
        .bind(fields.student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(registration)
    }

    async fn update_registration(
        &self,
        id: Id,
        fields: &RegistrationFields,
    ) -> Result<Option<Registration>, RepoError> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"UPDATE registrations SET section_id = $2, student_id = $3
               WHERE registration_id = $1
               RETURNING registration_id, section_id, student_id"#,
        )
        .bind(id)
        .bind(fields.section_id)
        .bind(fields.student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(registration)
    }

    // --- DEPENDENTS ---

    async fn sections_for_instructor(&self, instructor_id: Id) -> Result<Vec<Section>, RepoError> {
        self.fetch_children(SECTION_COLUMNS, Entity::Section, "instructor_id", instructor_id)
            .await
    }

    async fn sections_for_course(&self, course_id: Id) -> Result<Vec<Section>, RepoError> {
        self.fetch_children(SECTION_COLUMNS, Entity::Section, "course_id", course_id)
            .await
    }

    async fn sections_for_semester(&self, semester_id: Id) -> Result<Vec<Section>, RepoError> {
        self.fetch_children(SECTION_COLUMNS, Entity::Section, "semester_id", semester_id)
            .await
    }

    async fn registrations_for_section(&self, section_id: Id) -> Result<Vec<Registration>, RepoError> {
        self.fetch_children(REGISTRATION_COLUMNS, Entity::Registration, "section_id", section_id)
            .await
    }

    async fn registrations_for_student(&self, student_id: Id) -> Result<Vec<Registration>, RepoError> {
        self.fetch_children(REGISTRATION_COLUMNS, Entity::Registration, "student_id", student_id)
            .await
    }
}
