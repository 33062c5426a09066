use anyhow::{Context, Result};
use dialoguer::{Input, Password};

use elearn_client::api;
use elearn_client::client::ElearnClient;
use elearn_client::config::{Command, Config};
use elearn_client::session::Role;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;

    // Initialize logging with the configured level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let client = ElearnClient::new(&config).await?;

    match command {
        Command::Login { email, role } => {
            let role = Role::parse(&role).with_context(|| {
                format!("unknown role '{role}', expected admin, teacher or student")
            })?;
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("failed to read email")?,
            };
            let password = Password::new()
                .with_prompt("Password")
                .interact()
                .context("failed to read password")?;

            let session = client.login(&email, &password, role).await?;
            println!(
                "Signed in as {} ({})",
                session.identity.display_name, session.identity.role
            );
        }

        Command::Whoami => match client.store().session().await {
            Some(session) => {
                println!(
                    "{} <{}>",
                    session.identity.display_name, session.identity.email
                );
                println!("role: {}", session.identity.role);
                println!("user id: {}", session.identity.user_id);
            }
            None => println!("Not signed in"),
        },

        Command::Profile => {
            let profile = api::fetch_profile(&client).await?;
            println!("{} <{}>", profile.display_name, profile.email);
            if let Some(role) = &profile.role {
                println!("role: {role}");
            }
            if let Some(contact) = &profile.contact_number {
                println!(
                    "contact: {}{}",
                    profile.phone_number_code.as_deref().unwrap_or(""),
                    contact
                );
            }
        }

        Command::UpdateProfile {
            fullname,
            phone_code,
            contact,
        } => {
            let update = api::ProfileUpdate {
                fullname,
                phone_number_code: phone_code,
                contact_number: contact,
            };
            let profile = api::update_profile(&client, &update).await?;
            println!(
                "Profile updated: {} <{}>",
                profile.display_name, profile.email
            );
        }

        Command::ForgotPassword { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("failed to read email")?,
            };
            let message = client.auth().request_password_reset(&email).await?;
            println!("{message}");

            let otp: String = Input::new()
                .with_prompt("OTP")
                .interact_text()
                .context("failed to read OTP")?;
            let message = client.auth().verify_reset_otp(&email, &otp).await?;
            println!("{message}");

            let password = Password::new()
                .with_prompt("New password")
                .with_confirmation("Confirm password", "Passwords do not match")
                .interact()
                .context("failed to read password")?;
            let message = client
                .auth()
                .confirm_password_reset(&email, &otp, &password, &password)
                .await?;
            println!("{message}");
        }

        Command::Logout => {
            client.logout().await?;
            println!("Signed out");
        }
    }

    Ok(())
}
