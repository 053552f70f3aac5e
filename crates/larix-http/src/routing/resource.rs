//! Resource controllers

use crate::errors::{HttpError, HttpResult};
use crate::request::LarixRequest;
use crate::response::LarixResponse;
use async_trait::async_trait;

/// Controller answering the conventional resource actions.
///
/// Every action defaults to 404 so controllers only implement what they
/// expose.
#[async_trait]
pub trait ResourceController: Send + Sync + 'static {
    async fn index(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn create(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn store(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn show(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn edit(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn update(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }

    async fn destroy(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        Err(HttpError::not_found(request.path()))
    }
}

/// Resource actions in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    Index,
    Create,
    Store,
    Show,
    Edit,
    Update,
    Destroy,
}

impl ResourceAction {
    pub const ALL: [ResourceAction; 7] = [
        ResourceAction::Index,
        ResourceAction::Create,
        ResourceAction::Store,
        ResourceAction::Show,
        ResourceAction::Edit,
        ResourceAction::Update,
        ResourceAction::Destroy,
    ];

    /// Actions exposed by API resources (no HTML forms)
    pub const API: [ResourceAction; 5] = [
        ResourceAction::Index,
        ResourceAction::Store,
        ResourceAction::Show,
        ResourceAction::Update,
        ResourceAction::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Index => "index",
            ResourceAction::Create => "create",
            ResourceAction::Store => "store",
            ResourceAction::Show => "show",
            ResourceAction::Edit => "edit",
            ResourceAction::Update => "update",
            ResourceAction::Destroy => "destroy",
        }
    }

    pub(crate) async fn call<C: ResourceController + ?Sized>(
        self,
        controller: &C,
        request: LarixRequest,
    ) -> HttpResult<LarixResponse> {
        match self {
            ResourceAction::Index => controller.index(request).await,
            ResourceAction::Create => controller.create(request).await,
            ResourceAction::Store => controller.store(request).await,
            ResourceAction::Show => controller.show(request).await,
            ResourceAction::Edit => controller.edit(request).await,
            ResourceAction::Update => controller.update(request).await,
            ResourceAction::Destroy => controller.destroy(request).await,
        }
    }
}

/// Singular form used for the resource route parameter
pub fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("sses") || name.ends_with("xes") || name.ends_with("ches") {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singular() {
        assert_eq!(singular("photos"), "photo");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("class"), "class");
    }
}
