// http.rs — HttpStore: EntityStore over the disclosure HTTP API.
//
// Wire surface:
//   GET  /companies/{id}                          -> company snapshot
//   POST /companies                               -> upsert identity
//   POST /companies/{id}/reporting-periods        -> upsert period row
//   POST /companies/{id}/{year}/emissions         -> one emissions slice
//   POST /companies/{id}/{year}/economy           -> economy figures
//   PUT  /companies/{id}/industry                 -> industry code
//   PUT  /companies/{id}/goals                    -> replace goal list
//   PUT  /companies/{id}/initiatives              -> replace initiatives
//
// Emissions and economy bodies carry both period dates so the server can
// upsert the period row as part of the write; {year} is the final year of
// the period range. A 404 on a write maps to CompanyNotFound, matching
// the memory store's refusal to create companies implicitly.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use em_model::{
    BiogenicEmissions, Company, CompanyId, CompanySnapshot, Economy, Goal, Industry, Initiative,
    ReportingPeriod, Scope1, Scope1And2, Scope2, Scope3, StatedTotalEmissions,
};

use crate::error::StoreError;
use crate::store::{EntityStore, PeriodKey};

pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }
        request.send().await.map_err(transport)
    }

    /// Write helper: 404 means the company row does not exist.
    async fn write(
        &self,
        method: Method,
        id: &CompanyId,
        path: &str,
        body: Value,
    ) -> Result<Response, StoreError> {
        let response = self.send(method, path, Some(body)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::CompanyNotFound(id.clone()));
        }
        checked(response).await
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Turn a non-success response into an API error with its body text.
async fn checked(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

fn emissions_path(id: &CompanyId, key: &PeriodKey) -> String {
    format!("/companies/{}/{}/emissions", id, key.year())
}

fn economy_path(id: &CompanyId, key: &PeriodKey) -> String {
    format!("/companies/{}/{}/economy", id, key.year())
}

/// Period-scoped body: both dates plus the one emissions slice written.
fn emissions_body(key: &PeriodKey, emissions: Value) -> Value {
    json!({
        "start_date": key.start_date,
        "end_date": key.end_date,
        "emissions": emissions,
    })
}

#[async_trait]
impl EntityStore for HttpStore {
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError> {
        let body = serde_json::to_value(company)?;
        debug!(company = %company.id, "upserting company identity");
        self.write(Method::POST, &company.id, "/companies", body)
            .await?;
        Ok(())
    }

    async fn get_company(&self, id: &CompanyId) -> Result<Option<CompanySnapshot>, StoreError> {
        let path = format!("/companies/{id}");
        let response = self.send(Method::GET, &path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let snapshot = checked(response)
            .await?
            .json::<CompanySnapshot>()
            .await
            .map_err(transport)?;
        Ok(Some(snapshot))
    }

    async fn find_reporting_period(
        &self,
        id: &CompanyId,
        end_date: NaiveDate,
    ) -> Result<Option<ReportingPeriod>, StoreError> {
        // The API has no period lookup; read the aggregate and filter.
        Ok(self
            .get_company(id)
            .await?
            .and_then(|snapshot| snapshot.period_ending(end_date).cloned()))
    }

    async fn create_reporting_period(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        report_url: Option<&str>,
    ) -> Result<ReportingPeriod, StoreError> {
        let body = json!({
            "start_date": key.start_date,
            "end_date": key.end_date,
            "report_url": report_url,
        });
        let path = format!("/companies/{id}/reporting-periods");
        debug!(company = %id, year = key.year(), "upserting reporting period");
        let period = self
            .write(Method::POST, id, &path, body)
            .await?
            .json::<ReportingPeriod>()
            .await
            .map_err(transport)?;
        Ok(period)
    }

    async fn upsert_scope1(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope1: &Scope1,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "scope1": scope1 }));
        debug!(company = %id, year = key.year(), "saving scope 1");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_scope2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope2: &Scope2,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "scope2": scope2 }));
        debug!(company = %id, year = key.year(), "saving scope 2");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_scope3(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        scope3: &Scope3,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "scope3": scope3 }));
        debug!(company = %id, year = key.year(), "saving scope 3");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_biogenic(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        biogenic: &BiogenicEmissions,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "biogenic": biogenic }));
        debug!(company = %id, year = key.year(), "saving biogenic emissions");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_scope1_and_2(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        combined: &Scope1And2,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "scope1_and_2": combined }));
        debug!(company = %id, year = key.year(), "saving combined scope 1+2");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_stated_total(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        stated: &StatedTotalEmissions,
    ) -> Result<(), StoreError> {
        let body = emissions_body(key, json!({ "stated_total_emissions": stated }));
        debug!(company = %id, year = key.year(), "saving stated total");
        self.write(Method::POST, id, &emissions_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_economy(
        &self,
        id: &CompanyId,
        key: &PeriodKey,
        economy: &Economy,
    ) -> Result<(), StoreError> {
        let body = json!({
            "start_date": key.start_date,
            "end_date": key.end_date,
            "economy": economy,
        });
        debug!(company = %id, year = key.year(), "saving economy figures");
        self.write(Method::POST, id, &economy_path(id, key), body)
            .await?;
        Ok(())
    }

    async fn upsert_industry(
        &self,
        id: &CompanyId,
        industry: &Industry,
    ) -> Result<(), StoreError> {
        let path = format!("/companies/{id}/industry");
        debug!(company = %id, "saving industry classification");
        self.write(Method::PUT, id, &path, json!({ "industry": industry }))
            .await?;
        Ok(())
    }

    async fn replace_goals(&self, id: &CompanyId, goals: &[Goal]) -> Result<(), StoreError> {
        let path = format!("/companies/{id}/goals");
        debug!(company = %id, count = goals.len(), "replacing goals");
        self.write(Method::PUT, id, &path, json!({ "goals": goals }))
            .await?;
        Ok(())
    }

    async fn replace_initiatives(
        &self,
        id: &CompanyId,
        initiatives: &[Initiative],
    ) -> Result<(), StoreError> {
        let path = format!("/companies/{id}/initiatives");
        debug!(company = %id, count = initiatives.len(), "replacing initiatives");
        self.write(
            Method::PUT,
            id,
            &path,
            json!({ "initiatives": initiatives }),
        )
        .await?;
        Ok(())
    }
}
