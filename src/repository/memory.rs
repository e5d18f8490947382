use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RepoError, Repository, Window};
use crate::models::{
    Course, CourseForm, Entity, Id, Instructor, InstructorForm, Registration, RegistrationFields,
    Section, SectionFields, Semester, SemesterFields, Student, StudentForm, User,
};

#[derive(Default)]
struct Tables {
    next_id: Id,
    instructors: BTreeMap<Id, Instructor>,
    courses: BTreeMap<Id, Course>,
    semesters: BTreeMap<Id, Semester>,
    sections: BTreeMap<Id, Section>,
    students: BTreeMap<Id, Student>,
    registrations: BTreeMap<Id, Registration>,
    users: HashMap<Uuid, (User, Vec<String>)>,
}

impl Tables {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn check_section_refs(&self, fields: &SectionFields) -> Result<(), RepoError> {
        if !self.semesters.contains_key(&fields.semester_id) {
            return Err(foreign_key("sections_semester_fk"));
        }
        if !self.courses.contains_key(&fields.course_id) {
            return Err(foreign_key("sections_course_fk"));
        }
        if !self.instructors.contains_key(&fields.instructor_id) {
            return Err(foreign_key("sections_instructor_fk"));
        }
        Ok(())
    }

    fn check_registration_refs(&self, fields: &RegistrationFields) -> Result<(), RepoError> {
        if !self.sections.contains_key(&fields.section_id) {
            return Err(foreign_key("registrations_section_fk"));
        }
        if !self.students.contains_key(&fields.student_id) {
            return Err(foreign_key("registrations_student_fk"));
        }
        Ok(())
    }

    /// Name of the RESTRICT constraint that blocks deleting this row, if any.
    fn blocking_constraint(&self, entity: Entity, id: Id) -> Option<&'static str> {
        let sections = || self.sections.values();
        let registrations = || self.registrations.values();
        match entity {
            Entity::Instructor => sections()
                .any(|s| s.instructor_id == id)
                .then_some("sections_instructor_fk"),
            Entity::Course => sections()
                .any(|s| s.course_id == id)
                .then_some("sections_course_fk"),
            Entity::Semester => sections()
                .any(|s| s.semester_id == id)
                .then_some("sections_semester_fk"),
            Entity::Section => registrations()
                .any(|r| r.section_id == id)
                .then_some("registrations_section_fk"),
            Entity::Student => registrations()
                .any(|r| r.student_id == id)
                .then_some("registrations_student_fk"),
            Entity::Registration => None,
        }
    }
}

fn unique(constraint: &str) -> RepoError {
    RepoError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn foreign_key(constraint: &str) -> RepoError {
    RepoError::ForeignKeyViolation {
        constraint: constraint.to_string(),
    }
}

/// Fails when a row other than `own_id` already matches `same`.
fn ensure_unique<T>(
    rows: &BTreeMap<Id, T>,
    own_id: Option<Id>,
    constraint: &str,
    same: impl Fn(&T) -> bool,
) -> Result<(), RepoError> {
    let clash = rows
        .iter()
        .any(|(id, row)| Some(*id) != own_id && same(row));
    if clash { Err(unique(constraint)) } else { Ok(()) }
}

fn window_of<T: Clone>(rows: impl Iterator<Item = T>, window: Option<Window>) -> Vec<T> {
    match window {
        Some(w) => rows
            .skip(usize::try_from(w.offset).unwrap_or(0))
            .take(usize::try_from(w.limit).unwrap_or(0))
            .collect(),
        None => rows.collect(),
    }
}

/// MemoryRepository
///
/// An in-process implementation of `Repository` with the same constraint behavior as
/// the Postgres schema: unique constraints, foreign keys on insert/update, and
/// `RESTRICT` on delete. Used by the test suite and by local runs with
/// `DATABASE_URL=memory`.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an identity and its permission codenames.
    pub fn with_user(mut self, user: User, permissions: &[&str]) -> Self {
        let grants = permissions.iter().map(|p| p.to_string()).collect();
        self.tables.get_mut().users.insert(user.id, (user, grants));
        self
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn get_user_permissions(&self, id: Uuid) -> Result<Vec<String>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .get(&id)
            .map(|(_, grants)| grants.clone())
            .unwrap_or_default())
    }

    async fn count(&self, entity: Entity) -> Result<i64, RepoError> {
        let tables = self.tables.lock().await;
        let total = match entity {
            Entity::Instructor => tables.instructors.len(),
            Entity::Section => tables.sections.len(),
            Entity::Course => tables.courses.len(),
            Entity::Registration => tables.registrations.len(),
            Entity::Semester => tables.semesters.len(),
            Entity::Student => tables.students.len(),
        };
        Ok(total as i64)
    }

    async fn delete(&self, entity: Entity, id: Id) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(constraint) = tables.blocking_constraint(entity, id) {
            return Err(foreign_key(constraint));
        }
        let removed = match entity {
            Entity::Instructor => tables.instructors.remove(&id).is_some(),
            Entity::Section => tables.sections.remove(&id).is_some(),
            Entity::Course => tables.courses.remove(&id).is_some(),
            Entity::Registration => tables.registrations.remove(&id).is_some(),
            Entity::Semester => tables.semesters.remove(&id).is_some(),
            Entity::Student => tables.students.remove(&id).is_some(),
        };
        Ok(removed)
    }

    // --- INSTRUCTORS ---

    async fn list_instructors(&self, window: Option<Window>) -> Result<Vec<Instructor>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window_of(tables.instructors.values().cloned(), window))
    }

    async fn get_instructor(&self, id: Id) -> Result<Option<Instructor>, RepoError> {
        Ok(self.tables.lock().await.instructors.get(&id).cloned())
    }

    async fn insert_instructor(&self, fields: &InstructorForm) -> Result<Instructor, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.instructors, None, "unique_instructor", |i| {
            i.last_name == fields.last_name
                && i.first_name == fields.first_name
                && i.disambiguator == fields.disambiguator
        })?;
        let instructor = Instructor {
            instructor_id: tables.allocate_id(),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            disambiguator: fields.disambiguator.clone(),
        };
        tables
            .instructors
            .insert(instructor.instructor_id, instructor.clone());
        Ok(instructor)
    }

    async fn update_instructor(
        &self,
        id: Id,
        fields: &InstructorForm,
    ) -> Result<Option<Instructor>, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.instructors, Some(id), "unique_instructor", |i| {
            i.last_name == fields.last_name
                && i.first_name == fields.first_name
                && i.disambiguator == fields.disambiguator
        })?;
        Ok(tables.instructors.get_mut(&id).map(|instructor| {
            instructor.first_name = fields.first_name.clone();
            instructor.last_name = fields.last_name.clone();
            instructor.disambiguator = fields.disambiguator.clone();
            instructor.clone()
        }))
    }

    // --- COURSES ---

    async fn list_courses(&self, window: Option<Window>) -> Result<Vec<Course>, RepoError> {
        let tables = self.tables.lock().await;
        let mut courses: Vec<Course> = tables.courses.values().cloned().collect();
        courses.sort_by(|a, b| {
            (&a.course_number, &a.course_name, a.course_id)
                .cmp(&(&b.course_number, &b.course_name, b.course_id))
        });
        Ok(window_of(courses.into_iter(), window))
    }

    async fn get_course(&self, id: Id) -> Result<Option<Course>, RepoError> {
        Ok(self.tables.lock().await.courses.get(&id).cloned())
    }

    async fn insert_course(&self, fields: &CourseForm) -> Result<Course, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.courses, None, "unique_course", |c| {
            c.course_number == fields.course_number && c.course_name == fields.course_name
        })?;
        let course = Course {
            course_id: tables.allocate_id(),
            course_number: fields.course_number.clone(),
            course_name: fields.course_name.clone(),
        };
        tables.courses.insert(course.course_id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, id: Id, fields: &CourseForm) -> Result<Option<Course>, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.courses, Some(id), "unique_course", |c| {
            c.course_number == fields.course_number && c.course_name == fields.course_name
        })?;
        Ok(tables.courses.get_mut(&id).map(|course| {
            course.course_number = fields.course_number.clone();
            course.course_name = fields.course_name.clone();
            course.clone()
        }))
    }

    // --- SEMESTERS ---

    async fn list_semesters(&self, window: Option<Window>) -> Result<Vec<Semester>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window_of(tables.semesters.values().cloned(), window))
    }

    async fn get_semester(&self, id: Id) -> Result<Option<Semester>, RepoError> {
        Ok(self.tables.lock().await.semesters.get(&id).cloned())
    }

    async fn insert_semester(&self, fields: &SemesterFields) -> Result<Semester, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.semesters, None, "unique_semester", |s| {
            s.year == fields.year && s.term == fields.term
        })?;
        let semester = Semester {
            semester_id: tables.allocate_id(),
            year: fields.year,
            term: fields.term.clone(),
        };
        tables.semesters.insert(semester.semester_id, semester.clone());
        Ok(semester)
    }

    async fn update_semester(
        &self,
        id: Id,
        fields: &SemesterFields,
    ) -> Result<Option<Semester>, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.semesters, Some(id), "unique_semester", |s| {
            s.year == fields.year && s.term == fields.term
        })?;
        Ok(tables.semesters.get_mut(&id).map(|semester| {
            semester.year = fields.year;
            semester.term = fields.term.clone();
            semester.clone()
        }))
    }

    // --- SECTIONS ---

    async fn list_sections(&self, window: Option<Window>) -> Result<Vec<Section>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window_of(tables.sections.values().cloned(), window))
    }

    async fn get_section(&self, id: Id) -> Result<Option<Section>, RepoError> {
        Ok(self.tables.lock().await.sections.get(&id).cloned())
    }

    async fn insert_section(&self, fields: &SectionFields) -> Result<Section, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.check_section_refs(fields)?;
        ensure_unique(&tables.sections, None, "unique_section", |s| {
            s.semester_id == fields.semester_id
                && s.course_id == fields.course_id
                && s.section_name == fields.section_name
        })?;
        let section = Section {
            section_id: tables.allocate_id(),
            section_name: fields.section_name.clone(),
            semester_id: fields.semester_id,
            course_id: fields.course_id,
            instructor_id: fields.instructor_id,
        };
        tables.sections.insert(section.section_id, section.clone());
        Ok(section)
    }

    async fn update_section(
        &self,
        id: Id,
        fields: &SectionFields,
    ) -> Result<Option<Section>, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.sections.contains_key(&id) {
            return Ok(None);
        }
        tables.check_section_refs(fields)?;
        ensure_unique(&tables.sections, Some(id), "unique_section", |s| {
            s.semester_id == fields.semester_id
                && s.course_id == fields.course_id
                && s.section_name == fields.section_name
        })?;
        Ok(tables.sections.get_mut(&id).map(|section| {
            section.section_name = fields.section_name.clone();
            section.semester_id = fields.semester_id;
            section.course_id = fields.course_id;
            section.instructor_id = fields.instructor_id;
            section.clone()
        }))
    }

    // --- STUDENTS ---

    async fn list_students(&self, window: Option<Window>) -> Result<Vec<Student>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window_of(tables.students.values().cloned(), window))
    }

    async fn get_student(&self, id: Id) -> Result<Option<Student>, RepoError> {
        Ok(self.tables.lock().await.students.get(&id).cloned())
    }

    async fn insert_student(&self, fields: &StudentForm) -> Result<Student, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.students, None, "unique_student", |s| {
            s.last_name == fields.last_name
                && s.first_name == fields.first_name
                && s.nickname == fields.nickname
                && s.disambiguator == fields.disambiguator
        })?;
        let student = Student {
            student_id: tables.allocate_id(),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            nickname: fields.nickname.clone(),
            disambiguator: fields.disambiguator.clone(),
        };
        tables.students.insert(student.student_id, student.clone());
        Ok(student)
    }

    async fn update_student(&self, id: Id, fields: &StudentForm) -> Result<Option<Student>, RepoError> {
        let mut tables = self.tables.lock().await;
        ensure_unique(&tables.students, Some(id), "unique_student", |s| {
            s.last_name == fields.last_name
                && s.first_name == fields.first_name
                && s.nickname == fields.nickname
                && s.disambiguator == fields.disambiguator
        })?;
        Ok(tables.students.get_mut(&id).map(|student| {
            student.first_name = fields.first_name.clone();
            student.last_name = fields.last_name.clone();
            student.nickname = fields.nickname.clone();
            student.disambiguator = fields.disambiguator.clone();
            student.clone()
        }))
    }

    // --- REGISTRATIONS ---

    async fn list_registrations(
        &self,
        window: Option<Window>,
    ) -> Result<Vec<Registration>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window_of(tables.registrations.values().cloned(), window))
    }

    async fn get_registration(&self, id: Id) -> Result<Option<Registration>, RepoError> {
        Ok(self.tables.lock().await.registrations.get(&id).cloned())
    }

    async fn insert_registration(
        &self,
        fields: &RegistrationFields,
    ) -> Result<Registration, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.check_registration_refs(fields)?;
        ensure_unique(&tables.registrations, None, "unique_registration", |r| {
            r.section_id == fields.section_id && r.student_id == fields.student_id
        })?;
        let registration = Registration {
            registration_id: tables.allocate_id(),
            section_id: fields.section_id,
            student_id: fields.student_id,
        };
        tables
            .registrations
            .insert(registration.registration_id, registration.clone());
        Ok(registration)
    }

    async fn update_registration(
        &self,
        id: Id,
        fields: &RegistrationFields,
    ) -> Result<Option<Registration>, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.registrations.contains_key(&id) {
            return Ok(None);
        }
        tables.check_registration_refs(fields)?;
        ensure_unique(&tables.registrations, Some(id), "unique_registration", |r| {
            r.section_id == fields.section_id && r.student_id == fields.student_id
        })?;
        Ok(tables.registrations.get_mut(&id).map(|registration| {
            registration.section_id = fields.section_id;
            registration.student_id = fields.student_id;
            registration.clone()
        }))
    }

    // --- DEPENDENTS ---

    async fn sections_for_instructor(&self, instructor_id: Id) -> Result<Vec<Section>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sections
            .values()
            .filter(|s| s.instructor_id == instructor_id)
            .cloned()
            .collect())
    }

    async fn sections_for_course(&self, course_id: Id) -> Result<Vec<Section>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sections
            .values()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn sections_for_semester(&self, semester_id: Id) -> Result<Vec<Section>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sections
            .values()
            .filter(|s| s.semester_id == semester_id)
            .cloned()
            .collect())
    }

    async fn registrations_for_section(&self, section_id: Id) -> Result<Vec<Registration>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .registrations
            .values()
            .filter(|r| r.section_id == section_id)
            .cloned()
            .collect())
    }

    async fn registrations_for_student(&self, student_id: Id) -> Result<Vec<Registration>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .registrations
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }
}
