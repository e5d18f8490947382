use utoipa::{
    IntoParams, OpenApi,
    openapi::{
        self, Content, OpenApiBuilder, Ref, Required,
        path::{
            HttpMethod, Operation as PathOperation, OperationBuilder, ParameterBuilder,
            ParameterIn, PathItemBuilder, PathsBuilder,
        },
        request_body::RequestBodyBuilder,
        response::ResponseBuilder,
        schema::{ObjectBuilder, Type},
    },
};

use crate::{
    access::{Operation, Permission},
    handlers, models,
    models::Entity,
    pagination::PageQuery,
    validation::FieldErrors,
};

const TAG: &str = "courseinfo";

/// ApiDoc
///
/// Schemas and the handful of non-generic routes. The catalog routes are added by
/// [`openapi`], one path group per entity.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::root_redirect, handlers::health),
    components(
        schemas(
            models::Entity, models::Instructor, models::Course, models::Semester,
            models::Section, models::Student, models::Registration,
            models::InstructorForm, models::CourseForm, models::SemesterForm,
            models::SectionForm, models::StudentForm, models::RegistrationForm,
            models::InstructorDetail, models::CourseDetail, models::SemesterDetail,
            models::SectionDetail, models::StudentDetail, models::RegistrationDetail,
            models::Choice, FieldErrors,
        )
    ),
    tags(
        (name = "courseinfo", description = "Course catalog administration API")
    )
)]
pub struct ApiDoc;

/// openapi
///
/// The complete document served at `/api-docs/openapi.json`.
pub fn openapi() -> openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let mut paths = PathsBuilder::new();
    for entity in Entity::ALL {
        paths = catalog_paths(paths, entity);
    }
    doc.merge(OpenApiBuilder::new().paths(paths).build());
    doc
}

fn catalog_paths(paths: PathsBuilder, entity: Entity) -> PathsBuilder {
    let slug = entity.slug();
    let label = entity.label();
    let form = format!("{}Form", label);
    let detail = format!("{}Detail", label);

    paths
        .path(
            format!("/{slug}/"),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entity, Operation::List, "list")
                        .parameters(Some(PageQuery::into_params(|| None)))
                        .response("200", json_response("One page of records", None)),
                )
                .build(),
        )
        .path(
            format!("/{slug}/{{id}}"),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entity, Operation::Detail, "detail")
                        .parameter(id_parameter())
                        .response("200", json_response("Record with related collections", Some(detail.as_str())))
                        .response("404", ResponseBuilder::new().description("Unknown id")),
                )
                .build(),
        )
        .path(
            format!("/{slug}/create/"),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entity, Operation::Create, "create_form")
                        .response("200", json_response("Blank form with choices", None)),
                )
                .operation(HttpMethod::Post, submit(entity, Operation::Create, "create", &form, None))
                .build(),
        )
        .path(
            format!("/{slug}/{{id}}/update"),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entity, Operation::Update, "update_form")
                        .parameter(id_parameter())
                        .response("200", json_response("Form filled with current values", None))
                        .response("404", ResponseBuilder::new().description("Unknown id")),
                )
                .operation(
                    HttpMethod::Post,
                    submit(entity, Operation::Update, "update", &form, Some(id_parameter())),
                )
                .build(),
        )
        .path(
            format!("/{slug}/{{id}}/delete/"),
            PathItemBuilder::new()
                .operation(
                    HttpMethod::Get,
                    operation(entity, Operation::Delete, "delete_confirm")
                        .parameter(id_parameter())
                        .response("200", json_response("Object to confirm", Some(label)))
                        .response("409", json_response("Deletion refused, dependents listed", None)),
                )
                .operation(
                    HttpMethod::Post,
                    operation(entity, Operation::Delete, "delete")
                        .parameter(id_parameter())
                        .response("303", ResponseBuilder::new().description("Deleted, redirect to the list"))
                        .response("409", json_response("Deletion refused, dependents listed", None)),
                )
                .build(),
        )
}

/// Shared skeleton: tag, operation id, the required grant, and the access failures.
fn operation(entity: Entity, op: Operation, name: &str) -> OperationBuilder {
    let permission = Permission::new(entity, op.action());
    OperationBuilder::new()
        .tag(TAG)
        .operation_id(Some(format!("{}_{}", entity.slug(), name)))
        .description(Some(format!("Requires `{}`.", permission)))
        .response(
            "303",
            ResponseBuilder::new().description("Not authenticated, redirect to login"),
        )
        .response(
            "403",
            ResponseBuilder::new().description(format!("Missing `{}`", permission)),
        )
}

fn submit(
    entity: Entity,
    op: Operation,
    name: &str,
    form: &str,
    id: Option<ParameterBuilder>,
) -> PathOperation {
    let mut builder = operation(entity, op, name)
        .request_body(Some(
            RequestBodyBuilder::new()
                .content("application/json", Content::new(Some(Ref::from_schema_name(form))))
                .required(Some(Required::True))
                .build(),
        ))
        .response(
            "303",
            ResponseBuilder::new().description("Saved, redirect to the detail page"),
        )
        .response(
            "422",
            json_response("Form redisplayed with field errors", None),
        );
    if let Some(id) = id {
        builder = builder.parameter(id);
    }
    builder.build()
}

fn id_parameter() -> ParameterBuilder {
    ParameterBuilder::new()
        .name("id")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .schema(Some(ObjectBuilder::new().schema_type(Type::Integer)))
}

fn json_response(description: &str, schema: Option<&str>) -> ResponseBuilder {
    let builder = ResponseBuilder::new().description(description);
    match schema {
        Some(name) => builder.content(
            "application/json",
            Content::new(Some(Ref::from_schema_name(name))),
        ),
        None => builder,
    }
}
