use courseinfo::{
    AppError, MemoryRepository,
    controller::Controller,
    models::{
        Course, CourseForm, Entity, Instructor, InstructorForm, Registration, RegistrationForm,
        Section, SectionForm, Semester, SemesterForm, Student, StudentForm,
    },
    validation::{INVALID_CHOICE, NON_FIELD_ERRORS, NULL_CHARACTERS, REQUIRED},
};
use serde_json::Value;

// --- Fixtures ---

fn course_form(number: &str, name: &str) -> CourseForm {
    CourseForm {
        course_number: number.to_string(),
        course_name: name.to_string(),
    }
}

fn instructor_form(first: &str, last: &str) -> InstructorForm {
    InstructorForm {
        first_name: first.to_string(),
        last_name: last.to_string(),
        disambiguator: String::new(),
    }
}

fn student_form(first: &str, last: &str) -> StudentForm {
    StudentForm {
        first_name: first.to_string(),
        last_name: last.to_string(),
        ..StudentForm::default()
    }
}

/// A section with freshly created instructor, course and semester.
struct Catalog {
    instructor: Instructor,
    course: Course,
    semester: Semester,
    section: Section,
}

async fn seed_catalog(repo: &MemoryRepository) -> Catalog {
    let instructor = Controller::<Instructor>::new(repo)
        .create(instructor_form("Ada", "Lovelace"))
        .await
        .unwrap();
    let course = Controller::<Course>::new(repo)
        .create(course_form("CS101", "Intro"))
        .await
        .unwrap();
    let semester = Controller::<Semester>::new(repo)
        .create(SemesterForm {
            year: Some(2024),
            term: "Fall".to_string(),
        })
        .await
        .unwrap();
    let section = Controller::<Section>::new(repo)
        .create(SectionForm {
            section_name: "001".to_string(),
            semester: Some(semester.semester_id),
            course: Some(course.course_id),
            instructor: Some(instructor.instructor_id),
        })
        .await
        .unwrap();
    Catalog {
        instructor,
        course,
        semester,
        section,
    }
}

fn expect_validation(result: Result<impl std::fmt::Debug, AppError>) -> (courseinfo::validation::FieldErrors, Value) {
    match result {
        Err(AppError::ValidationFailure { errors, form, .. }) => (errors, form),
        other => panic!("expected ValidationFailure, got {:?}", other),
    }
}

// --- Create / Update ---

#[tokio::test]
async fn duplicate_course_is_a_validation_failure() {
    let repo = MemoryRepository::new();
    let courses = Controller::<Course>::new(&repo);

    let first = courses.create(course_form("CS101", "Intro")).await.unwrap();
    let (errors, form) = expect_validation(courses.create(course_form("CS101", "Intro")).await);

    assert_eq!(
        errors.get(NON_FIELD_ERRORS),
        ["Course with this Course number and Course name already exists.".to_string()]
    );
    // Submitted values are preserved for redisplay.
    assert_eq!(form["values"]["course_number"], "CS101");
    assert_eq!(form["entity"], "course");

    let page = courses.list(None).await.unwrap();
    assert_eq!(page.items, vec![first]);
}

#[tokio::test]
async fn update_into_a_collision_leaves_data_unchanged() {
    let repo = MemoryRepository::new();
    let courses = Controller::<Course>::new(&repo);
    courses.create(course_form("CS101", "Intro")).await.unwrap();
    let other = courses.create(course_form("CS102", "Data")).await.unwrap();

    let result = courses
        .update(other.course_id, course_form("CS101", "Intro"))
        .await;
    let (_, form) = expect_validation(result);
    assert_eq!(form["object_id"], other.course_id);

    let detail = courses.get(other.course_id).await.unwrap();
    assert_eq!(detail.course, other);
}

#[tokio::test]
async fn create_then_detail_round_trips_submitted_values() {
    let repo = MemoryRepository::new();
    let students = Controller::<Student>::new(&repo);

    let created = students
        .create(StudentForm {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            nickname: "Amazing Grace".to_string(),
            disambiguator: String::new(),
        })
        .await
        .unwrap();
    let detail = students.get(created.student_id).await.unwrap();

    assert_eq!(detail.student.first_name, "Grace");
    assert_eq!(detail.student.last_name, "Hopper");
    assert_eq!(detail.student.nickname, "Amazing Grace");
    assert!(detail.registration_list.is_empty());
}

#[tokio::test]
async fn blank_and_overlong_fields_are_reported_per_field() {
    let repo = MemoryRepository::new();
    let (errors, _) = expect_validation(
        Controller::<Course>::new(&repo)
            .create(course_form("", &"x".repeat(226)))
            .await,
    );
    assert_eq!(errors.get("course_number"), [REQUIRED.to_string()]);
    assert_eq!(
        errors.get("course_name"),
        ["Ensure this value has at most 225 characters (it has 226).".to_string()]
    );
}

#[tokio::test]
async fn null_characters_are_rejected_per_field() {
    let repo = MemoryRepository::new();
    let courses = Controller::<Course>::new(&repo);
    let (errors, form) = expect_validation(courses.create(course_form("A\u{0}", "Intro")).await);
    assert_eq!(errors.get("course_number"), [NULL_CHARACTERS.to_string()]);
    assert!(!errors.contains("course_name"));
    assert_eq!(form["values"]["course_number"], "A\u{0}");
    assert!(courses.list(None).await.unwrap().items.is_empty());

    // Optional fields are checked too.
    let (errors, _) = expect_validation(
        Controller::<Student>::new(&repo)
            .create(StudentForm {
                nickname: "Ace\u{0}".to_string(),
                ..student_form("Grace", "Hopper")
            })
            .await,
    );
    assert_eq!(errors.get("nickname"), [NULL_CHARACTERS.to_string()]);
}

#[tokio::test]
async fn input_is_trimmed_before_validation() {
    let repo = MemoryRepository::new();
    let course = Controller::<Course>::new(&repo)
        .create(course_form("  CS101 ", " Intro"))
        .await
        .unwrap();
    assert_eq!(course.course_number, "CS101");
    assert_eq!(course.course_name, "Intro");

    let (errors, _) = expect_validation(
        Controller::<Instructor>::new(&repo)
            .create(instructor_form("   ", "Knuth"))
            .await,
    );
    assert!(errors.contains("first_name"));
}

#[tokio::test]
async fn semester_year_must_be_present_and_in_range() {
    let repo = MemoryRepository::new();
    let semesters = Controller::<Semester>::new(&repo);

    let (errors, _) = expect_validation(
        semesters
            .create(SemesterForm {
                year: None,
                term: "Fall".to_string(),
            })
            .await,
    );
    assert_eq!(errors.get("year"), [REQUIRED.to_string()]);

    let (errors, _) = expect_validation(
        semesters
            .create(SemesterForm {
                year: Some(1850),
                term: "Fall".to_string(),
            })
            .await,
    );
    assert_eq!(
        errors.get("year"),
        ["Ensure this value is greater than or equal to 1900.".to_string()]
    );
}

#[tokio::test]
async fn section_requires_existing_references() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;

    let (errors, form) = expect_validation(
        Controller::<Section>::new(&repo)
            .create(SectionForm {
                section_name: "002".to_string(),
                semester: Some(catalog.semester.semester_id),
                course: Some(9_999),
                instructor: None,
            })
            .await,
    );
    assert_eq!(errors.get("course"), [INVALID_CHOICE.to_string()]);
    assert_eq!(errors.get("instructor"), [REQUIRED.to_string()]);
    assert!(!errors.contains("semester"));
    // Choices are delivered with the redisplayed form.
    assert_eq!(form["choices"]["course"][0]["label"], "CS101 - Intro");
    assert_eq!(form["choices"]["instructor"][0]["label"], "Lovelace, Ada");
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let repo = MemoryRepository::new();
    let result = Controller::<Course>::new(&repo)
        .update(42, course_form("CS101", "Intro"))
        .await;
    assert!(matches!(
        result,
        Err(AppError::NotFound {
            entity: Entity::Course,
            id: 42
        })
    ));
}

#[tokio::test]
async fn edit_form_is_prefilled_with_current_values() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;

    let view = Controller::<Section>::new(&repo)
        .edit_form(catalog.section.section_id)
        .await
        .unwrap();
    assert_eq!(view.object_id, Some(catalog.section.section_id));
    assert_eq!(view.values.section_name, "001");
    assert_eq!(view.values.course, Some(catalog.course.course_id));
    assert!(view.errors.is_empty());
    assert_eq!(view.choices["semester"][0].label, "2024 - Fall");
}

// --- Detail ---

#[tokio::test]
async fn section_detail_includes_every_related_record() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;
    let student = Controller::<Student>::new(&repo)
        .create(student_form("Alan", "Turing"))
        .await
        .unwrap();
    let registration = Controller::<Registration>::new(&repo)
        .create(RegistrationForm {
            section: Some(catalog.section.section_id),
            student: Some(student.student_id),
        })
        .await
        .unwrap();

    let detail = Controller::<Section>::new(&repo)
        .get(catalog.section.section_id)
        .await
        .unwrap();
    assert_eq!(detail.semester, catalog.semester);
    assert_eq!(detail.course, catalog.course);
    assert_eq!(detail.instructor, catalog.instructor);
    assert_eq!(detail.registration_list, vec![registration]);

    let instructor = Controller::<Instructor>::new(&repo)
        .get(catalog.instructor.instructor_id)
        .await
        .unwrap();
    assert_eq!(instructor.section_list, vec![catalog.section]);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let repo = MemoryRepository::new();
    assert!(matches!(
        Controller::<Student>::new(&repo).get(7).await,
        Err(AppError::NotFound { .. })
    ));
}

// --- Delete Guard ---

#[tokio::test]
async fn delete_is_refused_while_sections_remain() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;
    let instructors = Controller::<Instructor>::new(&repo);
    let id = catalog.instructor.instructor_id;

    match instructors.delete(id).await {
        Err(AppError::DependentsExist {
            entity, dependents, ..
        }) => {
            assert_eq!(entity, Entity::Instructor);
            assert_eq!(dependents.len(), 1);
            assert_eq!(dependents[0]["section_id"], catalog.section.section_id);
        }
        other => panic!("expected DependentsExist, got {:?}", other),
    }
    assert!(instructors.get(id).await.is_ok());

    Controller::<Section>::new(&repo)
        .delete(catalog.section.section_id)
        .await
        .unwrap();
    instructors.delete(id).await.unwrap();
    assert!(matches!(
        instructors.get(id).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn confirmation_step_reports_the_same_refusal() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;

    let refused = Controller::<Course>::new(&repo)
        .confirm_delete(catalog.course.course_id)
        .await;
    assert!(matches!(refused, Err(AppError::DependentsExist { .. })));

    let semester_refused = Controller::<Semester>::new(&repo)
        .confirm_delete(catalog.semester.semester_id)
        .await;
    assert!(matches!(semester_refused, Err(AppError::DependentsExist { .. })));

    let empty = Controller::<Course>::new(&repo)
        .create(course_form("CS999", "Unused"))
        .await
        .unwrap();
    let confirmation = Controller::<Course>::new(&repo)
        .confirm_delete(empty.course_id)
        .await
        .unwrap();
    assert_eq!(confirmation.object, empty);
}

#[tokio::test]
async fn student_and_section_are_guarded_by_registrations() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;
    let student = Controller::<Student>::new(&repo)
        .create(student_form("Alan", "Turing"))
        .await
        .unwrap();
    let registration = Controller::<Registration>::new(&repo)
        .create(RegistrationForm {
            section: Some(catalog.section.section_id),
            student: Some(student.student_id),
        })
        .await
        .unwrap();

    assert!(matches!(
        Controller::<Student>::new(&repo).delete(student.student_id).await,
        Err(AppError::DependentsExist { .. })
    ));
    assert!(matches!(
        Controller::<Section>::new(&repo)
            .delete(catalog.section.section_id)
            .await,
        Err(AppError::DependentsExist { .. })
    ));

    // Registrations have no dependents; deleting one is unconditional.
    Controller::<Registration>::new(&repo)
        .delete(registration.registration_id)
        .await
        .unwrap();
    Controller::<Student>::new(&repo)
        .delete(student.student_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let repo = MemoryRepository::new();
    let catalog = seed_catalog(&repo).await;
    let student = Controller::<Student>::new(&repo)
        .create(student_form("Alan", "Turing"))
        .await
        .unwrap();
    let form = RegistrationForm {
        section: Some(catalog.section.section_id),
        student: Some(student.student_id),
    };
    let registrations = Controller::<Registration>::new(&repo);
    registrations.create(form.clone()).await.unwrap();

    let (errors, _) = expect_validation(registrations.create(form).await);
    assert_eq!(
        errors.get(NON_FIELD_ERRORS),
        ["Registration with this Section and Student already exists.".to_string()]
    );
}

// --- List ---

#[tokio::test]
async fn courses_are_listed_by_number_then_name() {
    let repo = MemoryRepository::new();
    let courses = Controller::<Course>::new(&repo);
    courses.create(course_form("CS201", "Algorithms")).await.unwrap();
    courses.create(course_form("CS101", "Intro B")).await.unwrap();
    courses.create(course_form("CS101", "Intro A")).await.unwrap();

    let page = courses.list(None).await.unwrap();
    let labels: Vec<String> = page.items.iter().map(|c| c.to_string()).collect();
    assert_eq!(
        labels,
        vec!["CS101 - Intro A", "CS101 - Intro B", "CS201 - Algorithms"]
    );
    assert_eq!(page.num_pages, 1);
    assert_eq!(page.per_page, None);
}

#[tokio::test]
async fn instructor_list_is_paginated_and_clamps_pages() {
    let repo = MemoryRepository::new();
    let instructors = Controller::<Instructor>::new(&repo);
    for n in 0..30 {
        instructors
            .create(instructor_form(&format!("First{n}"), "Smith"))
            .await
            .unwrap();
    }

    let first = instructors.list(None).await.unwrap();
    assert_eq!(first.items.len(), 25);
    assert_eq!((first.page, first.num_pages, first.count), (1, 2, 30));
    assert_eq!(first.next_url.as_deref(), Some("/instructor/?page=2"));

    let past_end = instructors.list(Some("99")).await.unwrap();
    assert_eq!(past_end.page, 2);
    assert_eq!(past_end.items.len(), 5);
    assert_eq!(past_end.previous_url.as_deref(), Some("/instructor/?page=1"));
    assert!(!past_end.has_next);

    let below_one = instructors.list(Some("0")).await.unwrap();
    assert_eq!(below_one.page, 2);
    let huge = instructors.list(Some("99999999999999999999")).await.unwrap();
    assert_eq!(huge.page, 2);

    let junk = instructors.list(Some("abc")).await.unwrap();
    assert_eq!(junk.page, 1);
    let last = instructors.list(Some("last")).await.unwrap();
    assert_eq!(last.page, 2);
}

#[tokio::test]
async fn empty_paginated_list_is_page_one_of_one() {
    let repo = MemoryRepository::new();
    let page = Controller::<Student>::new(&repo)
        .list(Some("3"))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!((page.page, page.num_pages, page.count), (1, 1, 0));
}

// --- Malformed Submissions ---

#[tokio::test]
async fn malformed_body_is_a_non_field_error() {
    let repo = MemoryRepository::new();
    let error = Controller::<Course>::new(&repo)
        .malformed_body(None, "expected value at line 1 column 1")
        .await;
    match error {
        AppError::ValidationFailure { errors, form, .. } => {
            assert!(errors.get(NON_FIELD_ERRORS)[0].contains("expected value"));
            assert_eq!(form["values"]["course_number"], "");
        }
        other => panic!("expected ValidationFailure, got {:?}", other),
    }
}
