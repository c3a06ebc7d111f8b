//! Operator desk application.
//!
//! - `services.rs`: component wiring (store, ledgers, sessions, coordinator, bus)
//! - `dto.rs`: operator actions and replies as they appear on the wire
//! - `errors.rs`: mapping of every failure into a `DeskError`

use chrono::{DateTime, Utc};

use depot_core::{AggregateId, Money, OperatorId};
use depot_infra::reports;
use depot_infra::{DealLedger, ItemSnapshot, ReceiptLineInput};
use depot_inventory::ItemDetails;
use depot_parties::{Counterparty, CounterpartyId};
use depot_shipping::{NewLine, ShipmentDraft};

use crate::app::dto::{
    CounterpartyView, DeskReply, DeskRequest, DeskResponse, OperatorAction, ReceiptLineRequest,
};
use crate::app::errors::DeskError;
use crate::app::services::Services;

pub mod dto;
pub mod errors;
pub mod services;

/// Single entry point for operator actions. Safe to share between threads; each
/// operator's draft is serialized by the draft manager.
pub struct ShipmentDesk {
    services: Services,
}

impl ShipmentDesk {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Handle one raw JSON request line.
    pub fn handle_line(&self, line: &str, now: DateTime<Utc>) -> DeskResponse {
        match serde_json::from_str::<DeskRequest>(line) {
            Ok(request) => self.handle(request, now).into(),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable request");
                Err::<DeskReply, _>(DeskError::bad_request(e.to_string())).into()
            }
        }
    }

    pub fn handle(&self, request: DeskRequest, now: DateTime<Utc>) -> Result<DeskReply, DeskError> {
        let operator = OperatorId::new(&request.operator)?;
        let span = tracing::info_span!("desk", %operator, action = request.action.name());
        let _entered = span.enter();

        if let Err(e) = self.services.drafts.expire_idle(now) {
            tracing::warn!(error = %e, "idle draft sweep failed");
        }

        let result = self.dispatch(&operator, request.action, now);
        match &result {
            Err(e) if e.fault => tracing::error!(code = e.code, message = %e.message, "action failed"),
            Err(e) => tracing::warn!(code = e.code, message = %e.message, "action refused"),
            Ok(_) => tracing::debug!("action handled"),
        }
        result
    }

    fn dispatch(
        &self,
        operator: &OperatorId,
        action: OperatorAction,
        now: DateTime<Utc>,
    ) -> Result<DeskReply, DeskError> {
        let drafts = &self.services.drafts;

        match action {
            OperatorAction::StartDraft => Ok(draft_reply(drafts.start(operator, now)?)),

            OperatorAction::ChooseCounterparty { counterparty } => {
                let counterparty = self.active_counterparty(&counterparty)?;
                let draft = drafts.with_draft_or_start(operator, now, |d| {
                    d.set_counterparty(counterparty.id_typed(), now)?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::AddLine {
                item_code,
                quantity,
                price,
            } => {
                let item = self.item_by_code(item_code)?;
                let draft = drafts.with_draft_or_start(operator, now, |d| {
                    let unit_price = match price {
                        Some(p) => Money::parse_major(&p)?,
                        None => self.suggest_price(d.counterparty(), &item)?,
                    };
                    d.add_line(
                        NewLine {
                            item_id: item.item_id,
                            item_code: item.code,
                            item_name: item.name.clone(),
                            quantity,
                            unit_price,
                        },
                        now,
                    )?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::UpdateLine {
                line_no,
                quantity,
                price,
            } => {
                let price = price.map(|p| Money::parse_major(&p)).transpose()?;
                let draft = drafts.with_draft(operator, |d| {
                    d.update_line(line_no, quantity, price, now)?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::RemoveLine { line_no } => {
                let draft = drafts.with_draft(operator, |d| {
                    d.remove_line(line_no, now)?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::RequestCheckout => {
                let draft = drafts.with_draft(operator, |d| {
                    d.request_checkout(now)?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::EditDraft => {
                let draft = drafts.with_draft(operator, |d| {
                    d.edit(now)?;
                    Ok::<_, DeskError>(d.clone())
                })?;
                Ok(draft_reply(draft))
            }

            OperatorAction::ConfirmCommit { counterparty } => {
                let counterparty = counterparty
                    .map(|c| self.counterparty(&c).map(|cp| cp.id_typed()))
                    .transpose()?;
                let deal = drafts.with_draft(operator, |d| {
                    Ok::<_, DeskError>(self.services.coordinator.commit(d, counterparty, now)?)
                })?;
                Ok(DeskReply::Committed { deal })
            }

            OperatorAction::CancelDraft => {
                let draft = drafts.cancel(operator, now)?;
                Ok(DeskReply::Cancelled { draft_id: draft.id() })
            }

            OperatorAction::ShowDraft => Ok(match drafts.snapshot(operator)? {
                Some(draft) => draft_reply(draft),
                None => DeskReply::NoDraft,
            }),

            OperatorAction::PostReceipt { supplier, lines } => {
                let supplier = self.counterparty(&supplier)?;
                let lines = lines
                    .iter()
                    .map(|l| self.receipt_line(l))
                    .collect::<Result<Vec<_>, _>>()?;
                let receipt = self
                    .services
                    .receipts
                    .post_receipt(supplier.id_typed(), &lines, now)?;
                Ok(DeskReply::Receipt { receipt })
            }

            OperatorAction::StockReport => Ok(DeskReply::Stock {
                report: reports::stock_report(self.services.ledger.as_ref())?,
            }),

            OperatorAction::SalesReport { period } => Ok(DeskReply::Sales {
                report: reports::sales_report(self.services.deals.as_ref(), period, now)?,
            }),

            OperatorAction::ExportSales { period } => {
                let mut buffer = Vec::new();
                let rows = reports::write_sales_csv(self.services.deals.as_ref(), period, now, &mut buffer)?;
                let content = String::from_utf8(buffer)
                    .map_err(|e| DeskError::fault("export_error", e.to_string()))?;
                Ok(DeskReply::Csv { rows, content })
            }

            OperatorAction::CreateItem {
                code,
                name,
                retail_price,
            } => {
                let details = ItemDetails {
                    code,
                    name,
                    retail_price: Money::parse_major(&retail_price)?,
                };
                let item_id = self.services.ledger.create_item(details, now)?;
                Ok(DeskReply::Item {
                    item: self.services.ledger.snapshot(item_id)?,
                })
            }

            OperatorAction::UpdateItem {
                item_code,
                name,
                retail_price,
            } => {
                let item = self.item_by_code(item_code)?;
                let details = ItemDetails {
                    code: item.code,
                    name: name.unwrap_or(item.name),
                    retail_price: match retail_price {
                        Some(p) => Money::parse_major(&p)?,
                        None => item.retail_price,
                    },
                };
                self.services
                    .ledger
                    .update_item_details(item.item_id, details, now)?;
                Ok(DeskReply::Item {
                    item: self.services.ledger.snapshot(item.item_id)?,
                })
            }

            OperatorAction::RegisterCounterparty { name, contact } => {
                if self.services.directory.find_by_name(&name)?.is_some() {
                    return Err(DeskError::new("conflict", format!("counterparty '{name}' exists")));
                }
                let counterparty = self.services.directory.register(&name, contact, now)?;
                Ok(DeskReply::Counterparty {
                    counterparty: CounterpartyView::from(&counterparty),
                })
            }

            OperatorAction::UpdateCounterparty {
                counterparty,
                name,
                contact,
            } => {
                let counterparty = self.counterparty(&counterparty)?;
                if let Some(name) = &name {
                    let taken = self.services.directory.find_by_name(name)?;
                    if taken.is_some_and(|other| other.id_typed() != counterparty.id_typed()) {
                        return Err(DeskError::new("conflict", format!("counterparty '{name}' exists")));
                    }
                }
                let updated = self.services.directory.update(
                    counterparty.id_typed(),
                    name,
                    contact,
                    now,
                )?;
                Ok(DeskReply::Counterparty {
                    counterparty: CounterpartyView::from(&updated),
                })
            }

            OperatorAction::ArchiveCounterparty { counterparty } => {
                let counterparty = self.counterparty(&counterparty)?;
                let archived = self
                    .services
                    .directory
                    .archive(counterparty.id_typed(), now)?;
                Ok(DeskReply::Counterparty {
                    counterparty: CounterpartyView::from(&archived),
                })
            }

            OperatorAction::ListCounterparties => Ok(DeskReply::Counterparties {
                counterparties: self
                    .services
                    .directory
                    .list()?
                    .iter()
                    .map(CounterpartyView::from)
                    .collect(),
            }),
        }
    }

    /// Look a counterparty up by id, falling back to a case-insensitive name match.
    fn counterparty(&self, reference: &str) -> Result<Counterparty, DeskError> {
        let directory = &self.services.directory;
        let found = match reference.parse::<AggregateId>() {
            Ok(id) => directory.get(CounterpartyId::new(id))?,
            Err(_) => directory.find_by_name(reference)?,
        };
        found.ok_or_else(|| {
            DeskError::new("unknown_counterparty", format!("no counterparty '{reference}'"))
        })
    }

    fn active_counterparty(&self, reference: &str) -> Result<Counterparty, DeskError> {
        let counterparty = self.counterparty(reference)?;
        if !counterparty.can_transact() {
            return Err(DeskError::new(
                "counterparty_archived",
                format!("counterparty '{}' is archived", counterparty.name()),
            ));
        }
        Ok(counterparty)
    }

    fn item_by_code(&self, code: u32) -> Result<ItemSnapshot, DeskError> {
        self.services
            .ledger
            .find_by_code(code)?
            .ok_or_else(|| DeskError::new("unknown_item", format!("no item with code {code}")))
    }

    /// Last price charged to the counterparty for this item, else the retail price.
    fn suggest_price(
        &self,
        counterparty: Option<CounterpartyId>,
        item: &ItemSnapshot,
    ) -> Result<Money, DeskError> {
        let previous = match counterparty {
            Some(cp) => self.services.deals.last_sale_price(cp, item.item_id)?,
            None => None,
        };
        Ok(previous.unwrap_or(item.retail_price))
    }

    fn receipt_line(&self, line: &ReceiptLineRequest) -> Result<ReceiptLineInput, DeskError> {
        Ok(ReceiptLineInput {
            item_id: self.item_by_code(line.item_code)?.item_id,
            quantity: line.quantity,
            unit_cost: Money::parse_major(&line.unit_cost)?,
        })
    }
}

fn draft_reply(draft: ShipmentDraft) -> DeskReply {
    DeskReply::Draft { draft: draft.into() }
}
