//! Tera stubs for `larix make`

pub const MODEL: &str = r#"use larix_orm::Model;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct {{ name }} {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Model for {{ name }} {
    fn table_name() -> String {
        "{{ table }}".to_string()
    }

    fn fillable() -> Vec<&'static str> {
        vec![]
    }

    fn hidden() -> Vec<&'static str> {
        vec![]
    }
}
"#;

pub const CONTROLLER: &str = r#"use larix_http::{HttpResult, LarixRequest, LarixResponse};

pub struct {{ name }};

impl {{ name }} {
    pub async fn index(_request: LarixRequest) -> HttpResult<LarixResponse> {
        Ok(LarixResponse::text("{{ name }}@index"))
    }
}
"#;

pub const RESOURCE_CONTROLLER: &str = r#"use async_trait::async_trait;
use larix_http::{HttpResult, LarixRequest, LarixResponse, ResourceController};

pub struct {{ name }};

#[async_trait]
impl ResourceController for {{ name }} {
    async fn index(&self, _request: LarixRequest) -> HttpResult<LarixResponse> {
        Ok(LarixResponse::text("{{ name }}@index"))
    }

    async fn create(&self, _request: LarixRequest) -> HttpResult<LarixResponse> {
        Ok(LarixResponse::text("{{ name }}@create"))
    }

    async fn store(&self, _request: LarixRequest) -> HttpResult<LarixResponse> {
        Ok(LarixResponse::redirect("/{{ resource }}"))
    }

    async fn show(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        let id = request.path_params.get("id").cloned().unwrap_or_default();
        Ok(LarixResponse::text(format!("{{ name }}@show {}", id)))
    }

    async fn edit(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        let id = request.path_params.get("id").cloned().unwrap_or_default();
        Ok(LarixResponse::text(format!("{{ name }}@edit {}", id)))
    }

    async fn update(&self, request: LarixRequest) -> HttpResult<LarixResponse> {
        let id = request.path_params.get("id").cloned().unwrap_or_default();
        Ok(LarixResponse::redirect(&format!("/{{ resource }}/{}", id)))
    }

    async fn destroy(&self, _request: LarixRequest) -> HttpResult<LarixResponse> {
        Ok(LarixResponse::redirect("/{{ resource }}"))
    }
}
"#;

pub const MIDDLEWARE: &str = r#"use larix_http::{LarixRequest, Middleware, Next, NextFuture};

#[derive(Debug, Clone, Default)]
pub struct {{ name }};

impl Middleware for {{ name }} {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        Box::pin(async move { next.run(request).await })
    }

    fn name(&self) -> &'static str {
        "{{ name }}"
    }
}
"#;

pub const POLICY: &str = r#"use larix_auth::Policy;

use crate::models::{{ model_snake }}::{{ model }};

pub struct {{ name }};

impl<U: Send + Sync> Policy<U, {{ model }}> for {{ name }} {
    fn view_any(&self, _user: &U) -> Option<bool> {
        Some(true)
    }

    fn view(&self, _user: &U, _{{ model_snake }}: &{{ model }}) -> Option<bool> {
        Some(true)
    }

    fn create(&self, _user: &U) -> Option<bool> {
        None
    }

    fn update(&self, _user: &U, _{{ model_snake }}: &{{ model }}) -> Option<bool> {
        None
    }

    fn delete(&self, _user: &U, _{{ model_snake }}: &{{ model }}) -> Option<bool> {
        None
    }
}
"#;

pub const SEEDER: &str = r#"use async_trait::async_trait;
use larix_orm::{Database, ModelResult, Seeder, SeederRunner};

pub struct {{ name }};

#[async_trait]
impl Seeder for {{ name }} {
    async fn run(&self, _db: &Database, _runner: &SeederRunner) -> ModelResult<()> {
        Ok(())
    }
}
"#;

pub const FACTORY: &str = r#"use larix_orm::{Factory, Row};
use serde_json::json;

use crate::models::{{ model_snake }}::{{ model }};

/// Factory for `{{ model }}` rows
pub fn {{ model_snake }}_factory() -> Factory<{{ model }}> {
    Factory::new(|fake| {
        let mut row = Row::new();
        row.insert("name".to_string(), json!(fake.name()));
        row
    })
}
"#;

pub const COMPONENT: &str = r#"<div class="{{ css_class }}">
{% raw %}    <h3>{{ $title ?? '' }}</h3>
    {!! $slot !!}
{% endraw %}</div>
"#;

/// Every stub by template name
pub const ALL: [(&str, &str); 8] = [
    ("model", MODEL),
    ("controller", CONTROLLER),
    ("resource_controller", RESOURCE_CONTROLLER),
    ("middleware", MIDDLEWARE),
    ("policy", POLICY),
    ("seeder", SEEDER),
    ("factory", FACTORY),
    ("component", COMPONENT),
];
