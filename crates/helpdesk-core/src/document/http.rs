//! Blocking client for the ticket API served by `helpdesk-server`

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{check_update, DocumentStore};
use crate::error::StoreError;
use crate::ticket::{Ticket, TicketFilter, TicketMessage, TicketUpdate};

#[derive(Debug)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct MessageCreated {
    new_message: TicketMessage,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Validation(format!("invalid base url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Validation(format!(
                "base url {} cannot carry a path",
                base_url
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("helpdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(format!("client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// `base_url` plus the given path segments, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Validation(format!("base url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        response
            .json()
            .map_err(|e| StoreError::Transport(format!("invalid response body: {}", e)))
    }
}

/// Map a non-success status to the matching store error.
fn unexpected(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(body),
        StatusCode::CONFLICT => StoreError::AlreadyExists(body),
        StatusCode::NOT_FOUND => StoreError::NotFound(body),
        _ => StoreError::Transport(format!("HTTP {}: {}", status, body)),
    }
}

impl DocumentStore for HttpDocumentStore {
    fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let response = self.send(self.client.post(self.url(&["tickets"])?).json(ticket))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(response))
        }
    }

    fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, StoreError> {
        let response = self.send(self.client.get(self.url(&["tickets", ticket_id])?))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::json(response).map(Some),
            _ => Err(unexpected(response)),
        }
    }

    fn update_ticket(&self, ticket_id: &str, update: &TicketUpdate) -> Result<Option<Ticket>, StoreError> {
        check_update(update)?;
        let response = self.send(
            self.client
                .patch(self.url(&["tickets", ticket_id])?)
                .json(update),
        )?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::json(response).map(Some),
            _ => Err(unexpected(response)),
        }
    }

    fn delete_ticket(&self, ticket_id: &str) -> Result<bool, StoreError> {
        let response = self.send(self.client.delete(self.url(&["tickets", ticket_id])?))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(unexpected(response)),
        }
    }

    fn find_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(customer) = &filter.customer_id {
            query.push(("customer_id", customer.as_str()));
        }
        if let Some(agent) = &filter.agent_id {
            query.push(("agent_id", agent.as_str()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.as_str()));
        }
        if let Some(priority) = filter.priority {
            query.push(("priority", priority.as_str()));
        }
        let response = self.send(self.client.get(self.url(&["tickets"])?).query(&query))?;
        if response.status().is_success() {
            Self::json(response)
        } else {
            Err(unexpected(response))
        }
    }

    fn append_message(
        &self,
        ticket_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Option<TicketMessage>, StoreError> {
        let response = self.send(
            self.client
                .post(self.url(&["tickets", ticket_id, "messages"])?)
                .query(&[("customer_id", sender_id)])
                .json(&NewMessage { text }),
        )?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::json::<MessageCreated>(response).map(|m| Some(m.new_message)),
            _ => Err(unexpected(response)),
        }
    }
}
