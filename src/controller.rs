use std::marker::PhantomData;

use crate::{
    error::{AppError, to_json},
    models::{DeleteConfirmation, FormView, Id, ListPage},
    pagination,
    repository::{RepoError, Repository, Window},
    resources::Resource,
    validation::{self, FieldErrors, ValidationError},
};

/// Shown when a referenced row disappears between validation and the write.
pub const STALE_REFERENCE: &str = "A referenced record no longer exists. Reload the form and try again.";

/// Controller
///
/// The list/get/create/update/delete flows, written once and instantiated per entity
/// through its `Resource` implementation. Access control happens before a controller
/// is ever reached.
pub struct Controller<'a, R: Resource> {
    repo: &'a dyn Repository,
    _resource: PhantomData<R>,
}

impl<'a, R: Resource> Controller<'a, R> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self {
            repo,
            _resource: PhantomData,
        }
    }

    /// list
    ///
    /// Paginated entities fetch only the requested window; the rest return every row
    /// as a single page.
    pub async fn list(&self, page: Option<&str>) -> Result<ListPage<R>, AppError> {
        let base_url = R::ENTITY.list_url();
        match R::PAGE_SIZE {
            Some(per_page) => {
                let count = self.repo.count(R::ENTITY).await?;
                let (page, num_pages) = pagination::resolve(page, count, per_page);
                let window = Window {
                    limit: per_page,
                    offset: (page - 1) * per_page,
                };
                let items = R::list(self.repo, Some(window)).await?;
                Ok(pagination::page_of(
                    items,
                    page,
                    num_pages,
                    count,
                    Some(per_page),
                    &base_url,
                ))
            }
            None => {
                let items = R::list(self.repo, None).await?;
                let count = items.len() as i64;
                Ok(pagination::page_of(items, 1, 1, count, None, &base_url))
            }
        }
    }

    pub async fn get(&self, id: Id) -> Result<R::Detail, AppError> {
        let record = self.load(id).await?;
        Ok(R::detail(self.repo, record).await?)
    }

    pub async fn blank_form(&self) -> Result<FormView<R::Form>, AppError> {
        self.form_view(None, R::Form::default(), FieldErrors::new())
            .await
    }

    pub async fn edit_form(&self, id: Id) -> Result<FormView<R::Form>, AppError> {
        let record = self.load(id).await?;
        self.form_view(Some(id), record.to_form(), FieldErrors::new())
            .await
    }

    /// create
    ///
    /// Validates then inserts. Any rejection, including a uniqueness clash detected by
    /// storage, comes back as `ValidationFailure` with the submitted values intact.
    pub async fn create(&self, mut form: R::Form) -> Result<R, AppError> {
        R::normalize(&mut form);
        let fields = match R::validate(self.repo, &form).await {
            Ok(fields) => fields,
            Err(err) => return Err(self.rejected(None, form, err).await),
        };

        match R::insert(self.repo, &fields).await {
            Ok(record) => {
                tracing::info!(entity = %R::ENTITY, id = record.id(), "created");
                Ok(record)
            }
            Err(err) => Err(self.write_failed(None, form, err).await),
        }
    }

    /// update
    ///
    /// Same validation as `create`; a missing target is `NotFound` before any input is judged.
    pub async fn update(&self, id: Id, mut form: R::Form) -> Result<R, AppError> {
        self.load(id).await?;
        R::normalize(&mut form);
        let fields = match R::validate(self.repo, &form).await {
            Ok(fields) => fields,
            Err(err) => return Err(self.rejected(Some(id), form, err).await),
        };

        match R::update(self.repo, id, &fields).await {
            Ok(Some(record)) => {
                tracing::info!(entity = %R::ENTITY, id, "updated");
                Ok(record)
            }
            Ok(None) => Err(self.not_found(id)),
            Err(err) => Err(self.write_failed(Some(id), form, err).await),
        }
    }

    /// confirm_delete
    ///
    /// The confirmation step: the object when nothing blocks its deletion, otherwise
    /// `DependentsExist` listing every blocking record.
    pub async fn confirm_delete(&self, id: Id) -> Result<DeleteConfirmation<R>, AppError> {
        let record = self.load(id).await?;
        self.guard(&record).await?;
        Ok(DeleteConfirmation {
            entity: R::ENTITY,
            object: record,
        })
    }

    /// delete
    ///
    /// Never cascades. Dependents are checked first; a dependent inserted after that
    /// check is still caught by the storage constraint and reported the same way.
    pub async fn delete(&self, id: Id) -> Result<(), AppError> {
        let record = self.load(id).await?;
        self.guard(&record).await?;

        match self.repo.delete(R::ENTITY, id).await {
            Ok(true) => {
                tracing::info!(entity = %R::ENTITY, id, "deleted");
                Ok(())
            }
            Ok(false) => Err(self.not_found(id)),
            Err(RepoError::ForeignKeyViolation { constraint }) => {
                tracing::debug!(entity = %R::ENTITY, id, %constraint, "delete blocked by storage");
                let dependents = R::dependents(self.repo, id).await?;
                Err(self.refusal(&record, dependents))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// malformed_body
    ///
    /// A submission whose body could not be decoded into the form at all. It is reported
    /// as a non-field validation message on an empty form.
    pub async fn malformed_body(&self, object_id: Option<Id>, detail: &str) -> AppError {
        let mut errors = FieldErrors::new();
        errors.add_non_field(format!("The submitted data could not be read: {}", detail));
        self.failure(object_id, R::Form::default(), errors).await
    }

    // --- Internals ---

    async fn load(&self, id: Id) -> Result<R, AppError> {
        R::fetch(self.repo, id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    fn not_found(&self, id: Id) -> AppError {
        AppError::NotFound {
            entity: R::ENTITY,
            id,
        }
    }

    async fn guard(&self, record: &R) -> Result<(), AppError> {
        let dependents = R::dependents(self.repo, record.id()).await?;
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(self.refusal(record, dependents))
        }
    }

    fn refusal(&self, record: &R, dependents: Vec<R::Dependent>) -> AppError {
        tracing::info!(
            entity = %R::ENTITY,
            id = record.id(),
            dependents = dependents.len(),
            "delete refused"
        );
        AppError::DependentsExist {
            entity: R::ENTITY,
            id: record.id(),
            object: to_json(record),
            dependents: dependents.iter().map(to_json).collect(),
        }
    }

    async fn form_view(
        &self,
        object_id: Option<Id>,
        values: R::Form,
        errors: FieldErrors,
    ) -> Result<FormView<R::Form>, AppError> {
        let choices = R::choices(self.repo).await?;
        Ok(FormView {
            entity: R::ENTITY,
            object_id,
            values,
            errors,
            choices,
        })
    }

    /// Builds the redisplayed form; a storage failure while loading choices wins.
    async fn failure(&self, object_id: Option<Id>, values: R::Form, errors: FieldErrors) -> AppError {
        tracing::debug!(entity = %R::ENTITY, ?object_id, invalid = errors.len(), "form rejected");
        match self.form_view(object_id, values, errors.clone()).await {
            Ok(view) => AppError::ValidationFailure {
                entity: R::ENTITY,
                errors,
                form: to_json(&view),
            },
            Err(err) => err,
        }
    }

    async fn rejected(&self, object_id: Option<Id>, form: R::Form, err: ValidationError) -> AppError {
        match err {
            ValidationError::Invalid(errors) => self.failure(object_id, form, errors).await,
            ValidationError::Storage(err) => err.into(),
        }
    }

    async fn write_failed(&self, object_id: Option<Id>, form: R::Form, err: RepoError) -> AppError {
        let mut errors = FieldErrors::new();
        match err {
            RepoError::UniqueViolation { .. } => {
                errors.add_non_field(validation::unique_message(
                    R::ENTITY.label(),
                    R::UNIQUE_TOGETHER,
                ));
            }
            RepoError::ForeignKeyViolation { .. } => errors.add_non_field(STALE_REFERENCE),
            other => return other.into(),
        }
        self.failure(object_id, form, errors).await
    }
}
