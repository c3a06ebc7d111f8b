//! End-to-end workflow tests.
//!
//! Receipt → StockLedger → DraftManager → CommitCoordinator → DealLedger → EventBus
//!
//! Verifies:
//! - committed deals carry the cost charged at consumption
//! - refused commits leave every item as it was
//! - concurrent commits never oversell
//! - abandoned drafts have no side effects

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{Duration, Utc};

    use depot_core::{Money, OperatorId};
    use depot_events::{EventBus, InMemoryEventBus};
    use depot_inventory::{CostPolicy, ItemDetails, ItemId};
    use depot_parties::CounterpartyId;
    use depot_shipping::{Deal, DraftState, NewLine};

    use crate::commit::{CommitCoordinator, CommitError, DealEnvelope};
    use crate::deal_ledger::{DealLedger, InMemoryDealLedger};
    use crate::directory::CounterpartyDirectory;
    use crate::event_store::InMemoryEventStore;
    use crate::receipts::{ReceiptJournal, ReceiptLineInput};
    use crate::reports::{self, Period};
    use crate::sessions::{DraftManager, SessionError};
    use crate::stock_ledger::StockLedger;

    type Store = Arc<InMemoryEventStore>;
    type Coordinator =
        CommitCoordinator<Store, Arc<InMemoryDealLedger>, Arc<InMemoryEventBus<DealEnvelope>>>;

    struct Depot {
        ledger: Arc<StockLedger<Store>>,
        receipts: ReceiptJournal<Store>,
        drafts: DraftManager,
        coordinator: Coordinator,
        deals: Arc<InMemoryDealLedger>,
        bus: Arc<InMemoryEventBus<DealEnvelope>>,
        customer: CounterpartyId,
        supplier: CounterpartyId,
    }

    fn setup(policy: CostPolicy) -> Depot {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let ledger = Arc::new(StockLedger::new(store.clone(), policy));
        let directory = Arc::new(CounterpartyDirectory::new(store.clone()));
        let customer = directory.register("Вектор", None, Utc::now()).unwrap().id_typed();
        let supplier = directory.register("ВЛДВ", None, Utc::now()).unwrap().id_typed();
        let deals = Arc::new(InMemoryDealLedger::new());
        let bus = Arc::new(InMemoryEventBus::new());

        Depot {
            receipts: ReceiptJournal::new(store, ledger.clone(), directory.clone()),
            coordinator: CommitCoordinator::new(ledger.clone(), directory, deals.clone(), bus.clone()),
            drafts: DraftManager::new(Duration::hours(1)),
            ledger,
            deals,
            bus,
            customer,
            supplier,
        }
    }

    fn operator(name: &str) -> OperatorId {
        OperatorId::new(name).unwrap()
    }

    impl Depot {
        fn item(&self, code: u32, name: &str) -> ItemId {
            self.ledger
                .create_item(
                    ItemDetails {
                        code,
                        name: name.to_string(),
                        retail_price: Money::from_minor(1000),
                    },
                    Utc::now(),
                )
                .unwrap()
        }

        fn receive(&self, lines: &[(ItemId, u64, i64)]) {
            let lines: Vec<ReceiptLineInput> = lines
                .iter()
                .map(|(item_id, quantity, cost)| ReceiptLineInput {
                    item_id: *item_id,
                    quantity: *quantity,
                    unit_cost: Money::from_minor(*cost),
                })
                .collect();
            self.receipts.post_receipt(self.supplier, &lines, Utc::now()).unwrap();
        }

        /// Fill the operator's draft and move it to checkout.
        fn prepare(&self, op: &OperatorId, lines: &[(ItemId, u64, i64)]) {
            self.drafts.start(op, Utc::now()).unwrap();
            for (item_id, quantity, price) in lines {
                let snapshot = self.ledger.snapshot(*item_id).unwrap();
                self.drafts
                    .with_draft(op, |d| {
                        d.add_line(
                            NewLine {
                                item_id: *item_id,
                                item_code: snapshot.code,
                                item_name: snapshot.name.clone(),
                                quantity: *quantity,
                                unit_price: Money::from_minor(*price),
                            },
                            Utc::now(),
                        )
                        .map_err(SessionError::from)
                    })
                    .unwrap();
            }
            self.drafts
                .with_draft(op, |d| d.request_checkout(Utc::now()).map_err(SessionError::from))
                .unwrap();
        }

        fn confirm(&self, op: &OperatorId) -> Result<Deal, CommitError> {
            self.drafts
                .with_draft(op, |d| {
                    Ok::<_, SessionError>(self.coordinator.commit(d, Some(self.customer), Utc::now()))
                })
                .unwrap()
        }
    }

    #[test]
    fn two_line_shipment_records_cost_and_profit() {
        let depot = setup(CostPolicy::Fifo);
        let a = depot.item(23, "Лосось 6-7");
        let b = depot.item(40, "Форель радужная 1.8-2.7");
        depot.receive(&[(a, 10, 700), (b, 10, 300)]);
        let op = operator("alice");

        depot.prepare(&op, &[(a, 3, 1000), (b, 2, 500)]);
        let deal = depot.confirm(&op).unwrap();

        assert_eq!(deal.lines().len(), 2);
        assert_eq!(deal.lines()[0].item_id, a);
        assert_eq!(deal.lines()[0].unit_cost, Money::from_minor(700));
        assert_eq!(deal.total_profit(), Money::from_minor(3 * 300 + 2 * 200));
        assert_eq!(depot.ledger.snapshot(a).unwrap().on_hand, 7);
        assert_eq!(depot.ledger.snapshot(b).unwrap().on_hand, 8);
        assert!(depot.drafts.snapshot(&op).unwrap().is_none());
        depot.ledger.audit().unwrap();
    }

    #[test]
    fn insufficient_stock_leaves_every_item_unchanged() {
        let depot = setup(CostPolicy::Fifo);
        let a = depot.item(1, "A");
        let b = depot.item(2, "B");
        depot.receive(&[(a, 2, 100), (b, 5, 100)]);
        let before = depot.ledger.list().unwrap();
        let op = operator("bob");

        depot.prepare(&op, &[(b, 1, 200), (a, 3, 200)]);
        let err = depot.confirm(&op).unwrap_err();

        assert_eq!(
            err,
            CommitError::InsufficientStock {
                item_id: a,
                requested: 3,
                available: 2
            }
        );
        assert_eq!(depot.ledger.list().unwrap(), before);
        assert!(depot.deals.is_empty());

        // The draft waits for correction.
        let draft = depot.drafts.snapshot(&op).unwrap().unwrap();
        assert_eq!(draft.state(), DraftState::PendingConfirmation);
    }

    #[test]
    fn concurrent_commits_for_the_last_unit_sell_it_once() {
        let depot = Arc::new(setup(CostPolicy::Fifo));
        let item = depot.item(23, "Лосось 6-7");
        depot.receive(&[(item, 1, 100)]);

        let operators: Vec<OperatorId> = (0..2).map(|i| operator(&format!("op{i}"))).collect();
        for op in &operators {
            depot.prepare(op, &[(item, 1, 150)]);
        }

        let barrier = Arc::new(Barrier::new(operators.len()));
        let handles: Vec<_> = operators
            .into_iter()
            .map(|op| {
                let depot = depot.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    depot.confirm(&op)
                })
            })
            .collect();
        let results: Vec<Result<Deal, CommitError>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(CommitError::InsufficientStock { requested: 1, available: 0, .. })
        )));
        let snapshot = depot.ledger.snapshot(item).unwrap();
        assert_eq!((snapshot.on_hand, snapshot.reserved), (0, 0));
    }

    #[test]
    fn cancelled_draft_never_touches_stock() {
        let depot = setup(CostPolicy::WeightedAverage);
        let item = depot.item(40, "Форель");
        depot.receive(&[(item, 4, 96018)]);
        let before = depot.ledger.snapshot(item).unwrap();
        let op = operator("carol");

        depot.prepare(&op, &[(item, 4, 99500)]);
        let cancelled = depot.drafts.cancel(&op, Utc::now()).unwrap();

        assert_eq!(cancelled.state(), DraftState::Aborted);
        assert_eq!(depot.ledger.snapshot(item).unwrap(), before);
        assert!(depot.deals.is_empty());
    }

    #[test]
    fn fifo_cost_follows_receipts_in_order() {
        let depot = setup(CostPolicy::Fifo);
        let item = depot.item(23, "Лосось 6-7");
        depot.receive(&[(item, 5, 200)]);
        depot.receive(&[(item, 5, 400)]);
        let op = operator("dave");

        depot.prepare(&op, &[(item, 7, 500)]);
        let deal = depot.confirm(&op).unwrap();

        // (5 × 2.00 + 2 × 4.00) / 7 = 2.5714…
        assert_eq!(deal.lines()[0].unit_cost, Money::from_minor(257));
        let lots: Vec<u64> = depot
            .ledger
            .snapshot(item)
            .unwrap()
            .lots
            .iter()
            .map(|l| l.remaining)
            .collect();
        assert_eq!(lots, vec![0, 3]);
        assert_eq!(depot.receipts.all().unwrap().len(), 2);
    }

    #[test]
    fn recorded_deals_reach_subscribers_and_reports() {
        let depot = setup(CostPolicy::Fifo);
        let item = depot.item(23, "Лосось 6-7");
        depot.receive(&[(item, 10, 130000)]);

        let subscription = depot.bus.subscribe();
        let (tx, rx) = std::sync::mpsc::channel();
        let consumer = thread::spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                let _ = tx.send(envelope.payload().deal.doc_number());
            }
        });

        for name in ["erin", "frank"] {
            let op = operator(name);
            depot.prepare(&op, &[(item, 2, 131150)]);
            depot.confirm(&op).unwrap();
        }

        let published: Vec<u64> = (0..2)
            .map(|_| rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(published, vec![1, 2]);

        let report = reports::sales_report(depot.deals.as_ref(), Period::Today, Utc::now()).unwrap();
        assert_eq!(report.deal_count, 2);
        assert_eq!(report.profit, Money::from_minor(4 * 1150));
        assert_eq!(
            depot.deals.last_sale_price(depot.customer, item).unwrap(),
            Some(Money::from_minor(131150))
        );

        drop(depot);
        consumer.join().unwrap();
    }
}
