use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeMap, fmt};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::validation::FieldErrors;

/// Primary key type shared by every catalog table (`BIGSERIAL`).
pub type Id = i64;

// --- Entity Catalogue ---

/// Entity
///
/// Names the six catalog entities. Routing, permission codenames, table names and
/// log messages are all derived from this one enum so they cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Entity {
    Instructor,
    Section,
    Course,
    Registration,
    Semester,
    Student,
}

impl Entity {
    pub const ALL: [Entity; 6] = [
        Entity::Instructor,
        Entity::Section,
        Entity::Course,
        Entity::Registration,
        Entity::Semester,
        Entity::Student,
    ];

    /// URL segment and permission suffix (`course` in `/course/` and `view_course`).
    pub fn slug(self) -> &'static str {
        match self {
            Entity::Instructor => "instructor",
            Entity::Section => "section",
            Entity::Course => "course",
            Entity::Registration => "registration",
            Entity::Semester => "semester",
            Entity::Student => "student",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Entity::Instructor => "Instructor",
            Entity::Section => "Section",
            Entity::Course => "Course",
            Entity::Registration => "Registration",
            Entity::Semester => "Semester",
            Entity::Student => "Student",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Entity::Instructor => "instructors",
            Entity::Section => "sections",
            Entity::Course => "courses",
            Entity::Registration => "registrations",
            Entity::Semester => "semesters",
            Entity::Student => "students",
        }
    }

    pub fn primary_key(self) -> &'static str {
        match self {
            Entity::Instructor => "instructor_id",
            Entity::Section => "section_id",
            Entity::Course => "course_id",
            Entity::Registration => "registration_id",
            Entity::Semester => "semester_id",
            Entity::Student => "student_id",
        }
    }

    pub fn list_url(self) -> String {
        format!("/{}/", self.slug())
    }

    pub fn detail_url(self, id: Id) -> String {
        format!("/{}/{}", self.slug(), id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

// --- Core Catalog Records (Mapped to Database) ---

/// Instructor
///
/// A teaching staff member. Owns zero or more sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Instructor {
    pub instructor_id: Id,
    pub first_name: String,
    pub last_name: String,
    // Distinguishes two instructors sharing a full name; usually empty.
    pub disambiguator: String,
}

/// Course
///
/// A catalog course. `(course_number, course_name)` is unique across all rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Course {
    pub course_id: Id,
    pub course_number: String,
    pub course_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Semester {
    pub semester_id: Id,
    pub year: i32,
    // Free-form term label, e.g. "Fall".
    pub term: String,
}

/// Section
///
/// One offering of a course in a semester, taught by one instructor.
/// All three references are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Section {
    pub section_id: Id,
    pub section_name: String,
    pub semester_id: Id,
    pub course_id: Id,
    pub instructor_id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Student {
    pub student_id: Id,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub disambiguator: String,
}

/// Registration
///
/// Join record linking one student to one section. Nothing depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Registration {
    pub registration_id: Id,
    pub section_id: Id,
    pub student_id: Id,
}

/// User
///
/// Local mirror of an identity issued by the external login flow. Grants are
/// stored separately in `user_permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub is_active: bool,
    // Holds every permission without explicit grants.
    pub is_superuser: bool,
}

// --- Display Labels ---

fn person_label(
    f: &mut fmt::Formatter<'_>,
    last_name: &str,
    first_name: &str,
    qualifier: &str,
) -> fmt::Result {
    if qualifier.is_empty() {
        write!(f, "{}, {}", last_name, first_name)
    } else {
        write!(f, "{}, {} ({})", last_name, first_name, qualifier)
    }
}

impl fmt::Display for Instructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        person_label(f, &self.last_name, &self.first_name, &self.disambiguator)
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.course_number, self.course_name)
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.year, self.term)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.section_name)
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qualifier = if self.nickname.is_empty() {
            &self.disambiguator
        } else {
            &self.nickname
        };
        person_label(f, &self.last_name, &self.first_name, qualifier)
    }
}

// --- Form Payloads (Input Schemas) ---
//
// Every field defaults so that an omitted value surfaces as a field-level
// "required" message instead of a body parse failure.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct InstructorForm {
    pub first_name: String,
    pub last_name: String,
    pub disambiguator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct CourseForm {
    pub course_number: String,
    pub course_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct SemesterForm {
    pub year: Option<i32>,
    pub term: String,
}

/// SectionForm
///
/// Reference fields carry the primary key of the chosen record; the available
/// options are delivered alongside the form as `choices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct SectionForm {
    pub section_name: String,
    pub semester: Option<Id>,
    pub course: Option<Id>,
    pub instructor: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct StudentForm {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub disambiguator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct RegistrationForm {
    pub section: Option<Id>,
    pub student: Option<Id>,
}

// --- Validated Field Sets (Repository Input) ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterFields {
    pub year: i32,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFields {
    pub section_name: String,
    pub semester_id: Id,
    pub course_id: Id,
    pub instructor_id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFields {
    pub section_id: Id,
    pub student_id: Id,
}

// --- Detail Payloads (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct InstructorDetail {
    pub instructor: Instructor,
    pub section_list: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CourseDetail {
    pub course: Course,
    pub section_list: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SemesterDetail {
    pub semester: Semester,
    pub section_list: Vec<Section>,
}

/// SectionDetail
///
/// A section together with every record it references and the registrations
/// that reference it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SectionDetail {
    pub section: Section,
    pub semester: Semester,
    pub course: Course,
    pub instructor: Instructor,
    pub registration_list: Vec<Registration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StudentDetail {
    pub student: Student,
    pub registration_list: Vec<Registration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegistrationDetail {
    pub registration: Registration,
    pub section: Section,
    pub student: Student,
}

// --- Form, List and Delete Envelopes ---

/// Choice
///
/// One selectable option for a reference field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Choice {
    pub value: Id,
    pub label: String,
}

/// Options per reference field, keyed by form field name.
pub type Choices = BTreeMap<String, Vec<Choice>>;

/// FormView
///
/// Everything a client needs to (re)display a create or update form: the values
/// to show, the messages attached to each field, and the options for reference fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormView<F> {
    pub entity: Entity,
    // Set when editing an existing record.
    pub object_id: Option<Id>,
    pub values: F,
    pub errors: FieldErrors,
    pub choices: Choices,
}

/// ListPage
///
/// One page of a list view. Unpaginated lists are a single page holding every row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub num_pages: i64,
    pub count: i64,
    pub per_page: Option<i64>,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
}

/// DeleteConfirmation
///
/// Returned by the confirmation step when nothing blocks the deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteConfirmation<T> {
    pub entity: Entity,
    pub object: T,
}
