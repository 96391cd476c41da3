//! Account commands: login, register, logout, whoami.

use anyhow::Result;
use clap::Args;
use console::Style;
use parley_client::{RegisterRequest, UserProfile};

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account username
    #[arg(short, long)]
    pub username: String,

    /// Password (prompted for when omitted)
    #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Arguments for the register command.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Account username
    #[arg(short, long)]
    pub username: String,

    /// Email address
    #[arg(short, long)]
    pub email: String,

    /// First name
    #[arg(long, default_value = "")]
    pub first_name: String,

    /// Last name
    #[arg(long, default_value = "")]
    pub last_name: String,

    /// Password (prompted for when omitted)
    #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Run the login command.
pub async fn login(args: LoginArgs, ctx: &Context) -> Result<()> {
    let password = match args.password {
        Some(p) => p,
        None => rpassword::prompt_password("Password: ")?,
    };

    let client = ctx.client()?;
    let auth = client.auth().login(&args.username, &password).await?;

    if ctx.json_output {
        return ctx.print_json(&auth.user);
    }

    let green = Style::new().green();
    println!(
        "{} Signed in as {}",
        green.apply_to("✓"),
        display_name(&auth.user)
    );
    Ok(())
}

/// Run the register command.
pub async fn register(args: RegisterArgs, ctx: &Context) -> Result<()> {
    let password = match args.password {
        Some(p) => p,
        None => {
            let first = rpassword::prompt_password("Password: ")?;
            let again = rpassword::prompt_password("Confirm password: ")?;
            if first != again {
                anyhow::bail!("Passwords do not match");
            }
            first
        }
    };

    let request = RegisterRequest::new(args.username, args.email, password)
        .with_name(args.first_name, args.last_name);

    let client = ctx.client()?;
    let auth = client.auth().register(&request).await?;

    if ctx.json_output {
        return ctx.print_json(&auth.user);
    }

    let green = Style::new().green();
    println!(
        "{} Account created. Signed in as {}",
        green.apply_to("✓"),
        display_name(&auth.user)
    );
    Ok(())
}

/// Run the logout command.
pub async fn logout(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let was_signed_in = client.credentials().has_credentials();

    client.auth().logout().await;

    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

/// Run the whoami command.
pub async fn whoami(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    if !client.credentials().has_credentials() {
        println!("Not signed in. Run 'parley login' to sign in.");
        return Ok(());
    }

    let user = client.auth().profile().await?;

    if ctx.json_output {
        return ctx.print_json(&user);
    }

    let dim = Style::new().dim();
    println!("{}", display_name(&user));
    if !user.email.is_empty() {
        println!("  {}", dim.apply_to(&user.email));
    }
    if ctx.verbose {
        println!("  {}", dim.apply_to(format!("id: {}", user.id)));
        println!("  {}", dim.apply_to(format!("server: {}", client.base_url())));
    }
    Ok(())
}

fn display_name(user: &UserProfile) -> String {
    let full = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if full.is_empty() {
        user.username.clone()
    } else {
        format!("{} ({})", user.username, full)
    }
}
