use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use reservas::config::AppConfig;
use reservas::models::{Availability, PaymentMethod, PaymentUpdate, ReservationForm, TimeRange};
use reservas::services::locking::LockManager;
use reservas::services::retry::RetryPolicy;
use reservas::state::AppState;
use reservas::{ClientError, Navigation};

/// Book municipal sports facilities from the terminal.
#[derive(Parser)]
#[command(name = "reservas", about = "Sports facility booking client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bookable slots for a facility and date.
    Availability {
        #[arg(short, long)]
        facility: i64,

        /// Date as YYYY-MM-DD.
        #[arg(short, long)]
        date: NaiveDate,
    },
    /// Keep printing availability until interrupted.
    Watch {
        #[arg(short, long)]
        facility: i64,

        #[arg(short, long)]
        date: NaiveDate,
    },
    /// Hold a slot for this session without booking it yet.
    Hold {
        #[arg(short, long)]
        facility: i64,

        #[arg(short, long)]
        date: NaiveDate,

        /// Time range, e.g. "10:00 - 11:00".
        #[arg(short, long)]
        time: TimeRange,
    },
    /// Book a slot.
    Book {
        #[arg(short, long)]
        facility: i64,

        #[arg(short, long)]
        date: NaiveDate,

        #[arg(short, long)]
        time: TimeRange,

        /// efectivo, tarjeta or transferencia.
        #[arg(short, long, value_parser = parse_payment_method, default_value = "efectivo")]
        payment: PaymentMethod,

        #[arg(short, long, default_value_t = 1)]
        attendees: u32,

        #[arg(short, long)]
        comments: Option<String>,

        /// Mark the reservation as paid once it is created.
        #[arg(long)]
        paid: bool,
    },
    /// Give back the slot held by this session.
    Release,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    tracing::info!(api = %config.api_url, session = %config.session_id, "starting");

    let state = AppState::from_config(config).context("failed to initialize client")?;

    match cli.command {
        Commands::Availability { facility, date } => {
            let checkout = state.checkout(facility, date);
            let availability = checkout.refresh().await?;
            print_availability(&availability);
            checkout.suspend();
        }
        Commands::Watch { facility, date } => watch(&state, facility, date).await?,
        Commands::Hold {
            facility,
            date,
            time,
        } => hold(&state, facility, date, time).await?,
        Commands::Book {
            facility,
            date,
            time,
            payment,
            attendees,
            comments,
            paid,
        } => {
            let form = ReservationForm {
                payment_method: payment,
                attendees,
                comments,
            };
            book(&state, facility, date, time, &form, paid).await?;
        }
        Commands::Release => {
            let locks = LockManager::new(
                state.api.clone(),
                state.session.clone(),
                RetryPolicy::default(),
            );
            match locks.held()? {
                Some(token) => {
                    locks.release().await;
                    println!("released {}", token.slot);
                }
                None => println!("no slot is held"),
            }
        }
    }

    Ok(())
}

async fn watch(state: &AppState, facility: i64, date: NaiveDate) -> anyhow::Result<()> {
    let mut checkout = state.checkout(facility, date);
    let mut updates = WatchStream::from_changes(checkout.subscribe());
    checkout.start_polling();
    println!(
        "watching facility {} on {} (Ctrl-C to stop)",
        checkout.facility_id(),
        checkout.date()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.next() => {
                let Some(snapshot) = update else { break };
                if let Some(error) = &snapshot.last_error {
                    println!("[{}] unavailable: {error}", snapshot.sequence);
                } else {
                    println!("[{}]", snapshot.sequence);
                    print_availability(&snapshot.availability);
                }
            }
        }
    }

    checkout.stop_polling().await;
    checkout.suspend();
    Ok(())
}

async fn hold(
    state: &AppState,
    facility: i64,
    date: NaiveDate,
    time: TimeRange,
) -> anyhow::Result<()> {
    let mut checkout = state.checkout(facility, date);
    if checkout.enter(Some(time))? == Navigation::ReservationList {
        println!("{}", ClientError::DuplicateBooking);
        return Ok(());
    }

    checkout.refresh().await?;
    let result: Result<_, ClientError> = async {
        checkout.select(time).await?;
        checkout.begin_confirmation().await
    }
    .await;

    match result {
        Ok(token) => {
            println!("holding {} (acquired {})", token.slot, token.acquired_at.to_rfc3339());
            checkout.suspend();
            Ok(())
        }
        Err(e) => report(e),
    }
}

async fn book(
    state: &AppState,
    facility: i64,
    date: NaiveDate,
    time: TimeRange,
    form: &ReservationForm,
    paid: bool,
) -> anyhow::Result<()> {
    let mut checkout = state.checkout(facility, date);
    if checkout.enter(Some(time))? == Navigation::ReservationList {
        println!("{}", ClientError::DuplicateBooking);
        return Ok(());
    }

    form.validate(None)?;
    checkout.refresh().await?;

    let result: Result<_, ClientError> = async {
        checkout.select(time).await?;
        checkout.begin_confirmation().await?;
        checkout.submit(form).await
    }
    .await;

    let reservation = match result {
        Ok(r) => r,
        Err(e) => {
            checkout.leave().await;
            return report(e);
        }
    };
    println!("reservation {} created for {}", reservation.id, checkout.slot(time));

    if paid {
        let updated = checkout
            .record_payment(reservation.id, &PaymentUpdate::paid())
            .await?;
        println!("payment recorded: {:?}", updated.estado_pago);
    }

    checkout.leave().await;
    Ok(())
}

fn report(e: ClientError) -> anyhow::Result<()> {
    match e.navigation() {
        Some(Navigation::SlotSelection { message }) => {
            println!("{message}");
            Ok(())
        }
        Some(Navigation::ReservationList) => {
            println!("{e}");
            Ok(())
        }
        _ => Err(e.into()),
    }
}

fn print_availability(availability: &Availability) {
    if availability.is_empty() {
        println!("  no slots");
        return;
    }
    for slot in &availability.available {
        println!("  {}  free", slot.range);
    }
    for slot in &availability.locked_by_other {
        println!("  {}  held by someone else", slot.range);
    }
}

fn parse_payment_method(s: &str) -> Result<PaymentMethod, String> {
    PaymentMethod::parse(s).ok_or_else(|| format!("unknown payment method: {s}"))
}
