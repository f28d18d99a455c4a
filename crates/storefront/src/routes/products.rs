//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use kestrel_core::ProductId;

use super::page::{PageContext, ProductView};
use crate::db::{ProductQuery, ProductRepository, SortDirection, SortKey};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::FlashMessage;
use crate::services::flash;
use crate::state::AppState;

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub q: Option<String>,
    /// Comma-separated category names.
    pub category: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl ProductsQuery {
    fn categories(&self) -> Vec<String> {
        self.category
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect()
    }

    fn sort(&self) -> Option<(SortKey, SortDirection)> {
        let key = SortKey::parse(self.sort.as_deref()?)?;
        let direction = self
            .direction
            .as_deref()
            .map(SortDirection::parse)
            .unwrap_or_default();
        Some((key, direction))
    }
}

/// Category badge data for templates.
#[derive(Clone)]
pub struct CategoryView {
    pub name: String,
    pub display_name: String,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<ProductView>,
    pub search_term: Option<String>,
    pub current_categories: Vec<CategoryView>,
    /// `"{sort}_{direction}"`, or `"None_None"` when unsorted.
    pub current_sorting: String,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub product: ProductView,
}

/// Display product listing page.
#[instrument(skip(state, session, user))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ProductsQuery>,
) -> Result<Response> {
    if query.q.as_deref().is_some_and(|q| q.trim().is_empty()) {
        flash::push(
            &session,
            FlashMessage::error("You didn't enter any search criteria!"),
        )
        .await?;
        return Ok(Redirect::to("/products").into_response());
    }

    let search_term = query.q.as_deref().map(str::trim).map(str::to_owned);
    let categories = query.categories();
    let sort = query.sort();

    let repo = ProductRepository::new(state.store().pool());
    let products = repo
        .list(&ProductQuery {
            search: search_term.clone(),
            categories: categories.clone(),
            sort,
        })
        .await?;
    let current_categories = if categories.is_empty() {
        Vec::new()
    } else {
        repo.categories_by_name(&categories).await?
    };

    let currency = state.config().stripe.currency;
    let page = PageContext::load(&state, &session, user.as_ref()).await?;

    Ok(ProductsIndexTemplate {
        page,
        products: products
            .iter()
            .map(|p| ProductView::new(p, currency))
            .collect(),
        search_term,
        current_categories: current_categories
            .iter()
            .map(|c| CategoryView {
                name: c.name.clone(),
                display_name: c.display_name().to_string(),
            })
            .collect(),
        current_sorting: sort.map_or_else(
            || "None_None".to_string(),
            |(key, direction)| format!("{}_{}", key.as_str(), direction.as_str()),
        ),
    }
    .into_response())
}

/// Display product detail page.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<ProductId>,
) -> Result<ProductShowTemplate> {
    let product = ProductRepository::new(state.store().pool())
        .get_by_id(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;

    let page = PageContext::load(&state, &session, user.as_ref()).await?;
    Ok(ProductShowTemplate {
        page,
        product: ProductView::new(&product, state.config().stripe.currency),
    })
}
