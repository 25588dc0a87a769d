//! Walks one donation centre through a booking, a lost race and a
//! cancellation against a throwaway sled database.
//!
//! Run with `RUST_LOG=info,audit=info cargo run --example booking`.

use chrono::{Duration, Utc};
use donation_booking::{
    audit::{AuditLogger, TracingAuditSink},
    calendar,
    config::BookingConfig,
    coordinator::{BookingCoordinator, BookingRequest, BookingStage},
    donor::DonorRecord,
    session::SessionContext,
    sled_store::SledStore,
    slot::DonationSlot,
    store::SlotQuery,
    types::{DonationType, TimeStamp},
    utils::donor_hash_id,
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BookingConfig::from_env();
    let dir = tempfile::tempdir()?;
    let store = Arc::new(SledStore::open(dir.path().join(&config.db_path))?);

    // one morning of blood slots and one plasma slot, three days out
    let day = Utc::now() + Duration::days(3);
    let mut slots = vec![];
    for hour in [0, 1, 2] {
        let at = TimeStamp::from(day + Duration::hours(hour));
        let slot = DonationSlot::new("center_north", at, DonationType::Blood, 2)?;
        store.put_slot(&slot)?;
        slots.push(slot);
    }
    let plasma = DonationSlot::new(
        "center_north",
        TimeStamp::from(day + Duration::hours(4)),
        DonationType::Plasma,
        1,
    )?;
    store.put_slot(&plasma)?;

    let alice = donor_hash_id("AB123456", "center_north");
    let bob = donor_hash_id("CD987654", "center_north");
    store.put_donor(&DonorRecord::new(&alice))?;
    store.put_donor(&DonorRecord::new(&bob))?;

    let (audit, drain) = AuditLogger::spawn(Arc::new(TracingAuditSink));
    let booking = BookingCoordinator::new(store.clone(), audit, config.clone());

    let query = SlotQuery::new(config.slot_query_limit)
        .center("center_north")
        .between(TimeStamp::now(), TimeStamp::from(day + Duration::days(1)));
    let projection = calendar::project_calendar(store.as_ref(), &query, Utc::now()).await?;
    for (date, availability) in &projection.days {
        println!(
            "{date}: blood {} places, plasma {} places",
            availability.blood.open_places, availability.plasma.open_places
        );
    }

    // Alice books the first blood slot and follows the progress
    let alice_session = SessionContext::donor(&alice);
    let (progress, mut watcher) = watch::channel(BookingStage::Selecting);
    let follower = tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            let stage = *watcher.borrow_and_update();
            println!("  stage: {stage}");
            if stage.is_terminal() {
                break;
            }
        }
    });
    let receipt = booking
        .book_with_progress(
            &alice_session,
            BookingRequest::for_donor(&alice_session, slots[0].snapshot()),
            &progress,
        )
        .await?;
    drop(progress);
    follower.await?;
    println!(
        "alice booked {} ({} of {} places taken)",
        receipt.appointment.id, receipt.slot_bookings, slots[0].capacity
    );

    // Bob still holds the calendar he loaded before Alice booked
    let bob_session = SessionContext::donor(&bob);
    match booking
        .book(
            &bob_session,
            BookingRequest::for_donor(&bob_session, slots[0].snapshot()),
        )
        .await
    {
        Ok(receipt) => println!("bob booked {}", receipt.appointment.id),
        Err(err) => {
            let shown = err.user_facing(&config.support_contact);
            println!(
                "bob was turned away: [{}] {} {}",
                shown.code, shown.message, shown.suggestion
            );
        }
    }

    // ... so he books the plasma slot instead, then changes his mind
    let bob_receipt = booking
        .book(
            &bob_session,
            BookingRequest::for_donor(&bob_session, plasma.snapshot()),
        )
        .await?;
    let cancelled = booking.cancel(&bob_session, &bob_receipt.appointment.id).await?;
    println!(
        "bob cancelled {} (place released: {})",
        cancelled.appointment.id, cancelled.place_released
    );

    drop(booking);
    drain.await?;
    store.flush().await?;

    Ok(())
}
