use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use crate::{
    models::{
        Choice, Choices, Course, CourseDetail, CourseForm, Entity, Id, Instructor,
        InstructorDetail, InstructorForm, Registration, RegistrationDetail, RegistrationFields,
        RegistrationForm, Section, SectionDetail, SectionFields, SectionForm, Semester,
        SemesterDetail, SemesterFields, SemesterForm, Student, StudentDetail, StudentForm,
    },
    repository::{RepoError, Repository, Window},
    validation::{self, FieldErrors, ValidationError},
};

/// Resource
///
/// Everything the generic controller needs to know about one catalog entity: how to
/// validate its form, load and persist it, assemble its detail view, and find the
/// records that block its deletion.
#[async_trait]
pub trait Resource: Serialize + Clone + Send + Sync + 'static {
    const ENTITY: Entity;
    /// Rows per list page; `None` lists every row on one page.
    const PAGE_SIZE: Option<i64> = None;
    /// Field labels of the entity's unique-together constraint, in message order.
    const UNIQUE_TOGETHER: &'static [&'static str];

    type Form: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static;
    type Fields: Send + Sync;
    type Detail: Serialize + Send;
    type Dependent: Serialize + Send;

    fn id(&self) -> Id;
    fn to_form(&self) -> Self::Form;
    fn normalize(form: &mut Self::Form);

    async fn choices(repo: &dyn Repository) -> Result<Choices, RepoError>;
    async fn validate(
        repo: &dyn Repository,
        form: &Self::Form,
    ) -> Result<Self::Fields, ValidationError>;

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError>;
    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError>;
    async fn detail(repo: &dyn Repository, record: Self) -> Result<Self::Detail, RepoError>;
    async fn insert(repo: &dyn Repository, fields: &Self::Fields) -> Result<Self, RepoError>;
    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &Self::Fields,
    ) -> Result<Option<Self>, RepoError>;

    /// Records that reference this one and therefore block its deletion.
    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Self::Dependent>, RepoError>;
}

fn choice_list<T: ToString>(rows: &[T], id: impl Fn(&T) -> Id) -> Vec<Choice> {
    rows.iter()
        .map(|row| Choice {
            value: id(row),
            label: row.to_string(),
        })
        .collect()
}

fn missing(entity: Entity, id: Id) -> RepoError {
    RepoError::MissingReference { entity, id }
}

// --- Instructor ---

#[async_trait]
impl Resource for Instructor {
    const ENTITY: Entity = Entity::Instructor;
    const PAGE_SIZE: Option<i64> = Some(25);
    const UNIQUE_TOGETHER: &'static [&'static str] = &["Last name", "First name", "Disambiguator"];

    type Form = InstructorForm;
    type Fields = InstructorForm;
    type Detail = InstructorDetail;
    type Dependent = Section;

    fn id(&self) -> Id {
        self.instructor_id
    }

    fn to_form(&self) -> InstructorForm {
        InstructorForm {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            disambiguator: self.disambiguator.clone(),
        }
    }

    fn normalize(form: &mut InstructorForm) {
        validation::trim(&mut form.first_name);
        validation::trim(&mut form.last_name);
        validation::trim(&mut form.disambiguator);
    }

    async fn choices(_repo: &dyn Repository) -> Result<Choices, RepoError> {
        Ok(Choices::new())
    }

    async fn validate(
        _repo: &dyn Repository,
        form: &InstructorForm,
    ) -> Result<InstructorForm, ValidationError> {
        let mut errors = FieldErrors::new();
        validation::required_text(&mut errors, "first_name", &form.first_name, 45);
        validation::required_text(&mut errors, "last_name", &form.last_name, 45);
        validation::optional_text(&mut errors, "disambiguator", &form.disambiguator, 45);
        errors.finish(form.clone())
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_instructors(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_instructor(id).await
    }

    async fn detail(repo: &dyn Repository, instructor: Self) -> Result<InstructorDetail, RepoError> {
        let section_list = repo.sections_for_instructor(instructor.instructor_id).await?;
        Ok(InstructorDetail {
            instructor,
            section_list,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &InstructorForm) -> Result<Self, RepoError> {
        repo.insert_instructor(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &InstructorForm,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_instructor(id, fields).await
    }

    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Section>, RepoError> {
        repo.sections_for_instructor(id).await
    }
}

// --- Course ---

#[async_trait]
impl Resource for Course {
    const ENTITY: Entity = Entity::Course;
    const UNIQUE_TOGETHER: &'static [&'static str] = &["Course number", "Course name"];

    type Form = CourseForm;
    type Fields = CourseForm;
    type Detail = CourseDetail;
    type Dependent = Section;

    fn id(&self) -> Id {
        self.course_id
    }

    fn to_form(&self) -> CourseForm {
        CourseForm {
            course_number: self.course_number.clone(),
            course_name: self.course_name.clone(),
        }
    }

    fn normalize(form: &mut CourseForm) {
        validation::trim(&mut form.course_number);
        validation::trim(&mut form.course_name);
    }

    async fn choices(_repo: &dyn Repository) -> Result<Choices, RepoError> {
        Ok(Choices::new())
    }

    async fn validate(_repo: &dyn Repository, form: &CourseForm) -> Result<CourseForm, ValidationError> {
        let mut errors = FieldErrors::new();
        validation::required_text(&mut errors, "course_number", &form.course_number, 20);
        validation::required_text(&mut errors, "course_name", &form.course_name, 225);
        errors.finish(form.clone())
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_courses(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_course(id).await
    }

    async fn detail(repo: &dyn Repository, course: Self) -> Result<CourseDetail, RepoError> {
        let section_list = repo.sections_for_course(course.course_id).await?;
        Ok(CourseDetail {
            course,
            section_list,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &CourseForm) -> Result<Self, RepoError> {
        repo.insert_course(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &CourseForm,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_course(id, fields).await
    }

    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Section>, RepoError> {
        repo.sections_for_course(id).await
    }
}

// --- Semester ---

#[async_trait]
impl Resource for Semester {
    const ENTITY: Entity = Entity::Semester;
    const UNIQUE_TOGETHER: &'static [&'static str] = &["Year", "Term"];

    type Form = SemesterForm;
    type Fields = SemesterFields;
    type Detail = SemesterDetail;
    type Dependent = Section;

    fn id(&self) -> Id {
        self.semester_id
    }

    fn to_form(&self) -> SemesterForm {
        SemesterForm {
            year: Some(self.year),
            term: self.term.clone(),
        }
    }

    fn normalize(form: &mut SemesterForm) {
        validation::trim(&mut form.term);
    }

    async fn choices(_repo: &dyn Repository) -> Result<Choices, RepoError> {
        Ok(Choices::new())
    }

    async fn validate(
        _repo: &dyn Repository,
        form: &SemesterForm,
    ) -> Result<SemesterFields, ValidationError> {
        let mut errors = FieldErrors::new();
        let year = validation::required(&mut errors, "year", form.year);
        if let Some(year) = year {
            validation::in_range(&mut errors, "year", year, 1900, 2100);
        }
        validation::required_text(&mut errors, "term", &form.term, 45);
        errors.finish(SemesterFields {
            year: year.unwrap_or_default(),
            term: form.term.clone(),
        })
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_semesters(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_semester(id).await
    }

    async fn detail(repo: &dyn Repository, semester: Self) -> Result<SemesterDetail, RepoError> {
        let section_list = repo.sections_for_semester(semester.semester_id).await?;
        Ok(SemesterDetail {
            semester,
            section_list,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &SemesterFields) -> Result<Self, RepoError> {
        repo.insert_semester(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &SemesterFields,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_semester(id, fields).await
    }

    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Section>, RepoError> {
        repo.sections_for_semester(id).await
    }
}

// --- Section ---

#[async_trait]
impl Resource for Section {
    const ENTITY: Entity = Entity::Section;
    const UNIQUE_TOGETHER: &'static [&'static str] = &["Semester", "Course", "Section name"];

    type Form = SectionForm;
    type Fields = SectionFields;
    type Detail = SectionDetail;
    type Dependent = Registration;

    fn id(&self) -> Id {
        self.section_id
    }

    fn to_form(&self) -> SectionForm {
        SectionForm {
            section_name: self.section_name.clone(),
            semester: Some(self.semester_id),
            course: Some(self.course_id),
            instructor: Some(self.instructor_id),
        }
    }

    fn normalize(form: &mut SectionForm) {
        validation::trim(&mut form.section_name);
    }

    async fn choices(repo: &dyn Repository) -> Result<Choices, RepoError> {
        let semesters = repo.list_semesters(None).await?;
        let courses = repo.list_courses(None).await?;
        let instructors = repo.list_instructors(None).await?;

        let mut choices = Choices::new();
        choices.insert("semester".into(), choice_list(&semesters, |s| s.semester_id));
        choices.insert("course".into(), choice_list(&courses, |c| c.course_id));
        choices.insert("instructor".into(), choice_list(&instructors, |i| i.instructor_id));
        Ok(choices)
    }

    async fn validate(
        repo: &dyn Repository,
        form: &SectionForm,
    ) -> Result<SectionFields, ValidationError> {
        let mut errors = FieldErrors::new();
        validation::required_text(&mut errors, "section_name", &form.section_name, 10);

        let semester = validation::required(&mut errors, "semester", form.semester);
        if let Some(id) = semester {
            let found = repo.get_semester(id).await?.is_some();
            validation::existing(&mut errors, "semester", found);
        }
        let course = validation::required(&mut errors, "course", form.course);
        if let Some(id) = course {
            let found = repo.get_course(id).await?.is_some();
            validation::existing(&mut errors, "course", found);
        }
        let instructor = validation::required(&mut errors, "instructor", form.instructor);
        if let Some(id) = instructor {
            let found = repo.get_instructor(id).await?.is_some();
            validation::existing(&mut errors, "instructor", found);
        }

        errors.finish(SectionFields {
            section_name: form.section_name.clone(),
            semester_id: semester.unwrap_or_default(),
            course_id: course.unwrap_or_default(),
            instructor_id: instructor.unwrap_or_default(),
        })
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_sections(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_section(id).await
    }

    async fn detail(repo: &dyn Repository, section: Self) -> Result<SectionDetail, RepoError> {
        let semester = repo
            .get_semester(section.semester_id)
            .await?
            .ok_or_else(|| missing(Entity::Semester, section.semester_id))?;
        let course = repo
            .get_course(section.course_id)
            .await?
            .ok_or_else(|| missing(Entity::Course, section.course_id))?;
        let instructor = repo
            .get_instructor(section.instructor_id)
            .await?
            .ok_or_else(|| missing(Entity::Instructor, section.instructor_id))?;
        let registration_list = repo.registrations_for_section(section.section_id).await?;
        Ok(SectionDetail {
            section,
            semester,
            course,
            instructor,
            registration_list,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &SectionFields) -> Result<Self, RepoError> {
        repo.insert_section(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &SectionFields,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_section(id, fields).await
    }

    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Registration>, RepoError> {
        repo.registrations_for_section(id).await
    }
}

// --- Student ---

#[async_trait]
impl Resource for Student {
    const ENTITY: Entity = Entity::Student;
    const PAGE_SIZE: Option<i64> = Some(25);
    const UNIQUE_TOGETHER: &'static [&'static str] =
        &["Last name", "First name", "Nickname", "Disambiguator"];

    type Form = StudentForm;
    type Fields = StudentForm;
    type Detail = StudentDetail;
    type Dependent = Registration;

    fn id(&self) -> Id {
        self.student_id
    }

    fn to_form(&self) -> StudentForm {
        StudentForm {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
            disambiguator: self.disambiguator.clone(),
        }
    }

    fn normalize(form: &mut StudentForm) {
        validation::trim(&mut form.first_name);
        validation::trim(&mut form.last_name);
        validation::trim(&mut form.nickname);
        validation::trim(&mut form.disambiguator);
    }

    async fn choices(_repo: &dyn Repository) -> Result<Choices, RepoError> {
        Ok(Choices::new())
    }

    async fn validate(_repo: &dyn Repository, form: &StudentForm) -> Result<StudentForm, ValidationError> {
        let mut errors = FieldErrors::new();
        validation::required_text(&mut errors, "first_name", &form.first_name, 45);
        validation::required_text(&mut errors, "last_name", &form.last_name, 45);
        validation::optional_text(&mut errors, "nickname", &form.nickname, 45);
        validation::optional_text(&mut errors, "disambiguator", &form.disambiguator, 45);
        errors.finish(form.clone())
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_students(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_student(id).await
    }

    async fn detail(repo: &dyn Repository, student: Self) -> Result<StudentDetail, RepoError> {
        let registration_list = repo.registrations_for_student(student.student_id).await?;
        Ok(StudentDetail {
            student,
            registration_list,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &StudentForm) -> Result<Self, RepoError> {
        repo.insert_student(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &StudentForm,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_student(id, fields).await
    }

    async fn dependents(repo: &dyn Repository, id: Id) -> Result<Vec<Registration>, RepoError> {
        repo.registrations_for_student(id).await
    }
}

// --- Registration ---

#[async_trait]
impl Resource for Registration {
    const ENTITY: Entity = Entity::Registration;
    const UNIQUE_TOGETHER: &'static [&'static str] = &["Section", "Student"];

    type Form = RegistrationForm;
    type Fields = RegistrationFields;
    type Detail = RegistrationDetail;
    // Nothing references a registration.
    type Dependent = ();

    fn id(&self) -> Id {
        self.registration_id
    }

    fn to_form(&self) -> RegistrationForm {
        RegistrationForm {
            section: Some(self.section_id),
            student: Some(self.student_id),
        }
    }

    fn normalize(_form: &mut RegistrationForm) {}

    /// Sections are labelled with their course and semester, e.g. `CS101 - 001 (2024 - Fall)`.
    async fn choices(repo: &dyn Repository) -> Result<Choices, RepoError> {
        let courses: HashMap<Id, Course> = repo
            .list_courses(None)
            .await?
            .into_iter()
            .map(|c| (c.course_id, c))
            .collect();
        let semesters: HashMap<Id, Semester> = repo
            .list_semesters(None)
            .await?
            .into_iter()
            .map(|s| (s.semester_id, s))
            .collect();

        let sections = repo
            .list_sections(None)
            .await?
            .into_iter()
            .map(|s| {
                let course = courses
                    .get(&s.course_id)
                    .map(|c| c.course_number.as_str())
                    .unwrap_or("?");
                let label = match semesters.get(&s.semester_id) {
                    Some(semester) => format!("{} - {} ({})", course, s.section_name, semester),
                    None => format!("{} - {}", course, s.section_name),
                };
                Choice {
                    value: s.section_id,
                    label,
                }
            })
            .collect();
        let students = repo.list_students(None).await?;

        let mut choices = Choices::new();
        choices.insert("section".into(), sections);
        choices.insert("student".into(), choice_list(&students, |s| s.student_id));
        Ok(choices)
    }

    async fn validate(
        repo: &dyn Repository,
        form: &RegistrationForm,
    ) -> Result<RegistrationFields, ValidationError> {
        let mut errors = FieldErrors::new();

        let section = validation::required(&mut errors, "section", form.section);
        if let Some(id) = section {
            let found = repo.get_section(id).await?.is_some();
            validation::existing(&mut errors, "section", found);
        }
        let student = validation::required(&mut errors, "student", form.student);
        if let Some(id) = student {
            let found = repo.get_student(id).await?.is_some();
            validation::existing(&mut errors, "student", found);
        }

        errors.finish(RegistrationFields {
            section_id: section.unwrap_or_default(),
            student_id: student.unwrap_or_default(),
        })
    }

    async fn list(repo: &dyn Repository, window: Option<Window>) -> Result<Vec<Self>, RepoError> {
        repo.list_registrations(window).await
    }

    async fn fetch(repo: &dyn Repository, id: Id) -> Result<Option<Self>, RepoError> {
        repo.get_registration(id).await
    }

    async fn detail(repo: &dyn Repository, registration: Self) -> Result<RegistrationDetail, RepoError> {
        let section = repo
            .get_section(registration.section_id)
            .await?
            .ok_or_else(|| missing(Entity::Section, registration.section_id))?;
        let student = repo
            .get_student(registration.student_id)
            .await?
            .ok_or_else(|| missing(Entity::Student, registration.student_id))?;
        Ok(RegistrationDetail {
            registration,
            section,
            student,
        })
    }

    async fn insert(repo: &dyn Repository, fields: &RegistrationFields) -> Result<Self, RepoError> {
        repo.insert_registration(fields).await
    }

    async fn update(
        repo: &dyn Repository,
        id: Id,
        fields: &RegistrationFields,
    ) -> Result<Option<Self>, RepoError> {
        repo.update_registration(id, fields).await
    }

    async fn dependents(_repo: &dyn Repository, _id: Id) -> Result<Vec<()>, RepoError> {
        Ok(Vec::new())
    }
}
