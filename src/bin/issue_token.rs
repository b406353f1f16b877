//! Mints a development token signed with JWT_SECRET.
//!
//! cargo run --bin issue_token -- --sub u-42 --name "Ana" --role student --ttl-minutes 120

use tutoring_chat::auth::issue_token;
use tutoring_chat::models::auth::{Identity, Role};

fn usage() -> ! {
    eprintln!("usage: issue_token --sub <user id> --role <tutor|student|admin> [--name <display name>] [--ttl-minutes <n>]");
    std::process::exit(2);
}

fn main() {
    dotenvy::dotenv().ok();

    let mut sub = None;
    let mut name = None;
    let mut role = None;
    let mut ttl_minutes: i64 = 60;

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let value = args.next().unwrap_or_else(|| usage());
        match flag.as_str() {
            "--sub" => sub = Some(value),
            "--name" => name = Some(value),
            "--role" => role = Some(Role::parse(&value).unwrap_or_else(|| usage())),
            "--ttl-minutes" => ttl_minutes = value.parse().unwrap_or_else(|_| usage()),
            _ => usage(),
        }
    }

    let (Some(sub), Some(role)) = (sub, role) else {
        usage();
    };
    let secret = match std::env::var("JWT_SECRET") {
        Ok(secret) if !secret.trim().is_empty() => secret,
        _ => {
            eprintln!("❌ JWT_SECRET must be set");
            std::process::exit(1);
        }
    };

    let identity = Identity::new(&sub, name.unwrap_or_else(|| sub.clone()), role);
    match issue_token(secret.trim(), &identity, chrono::Duration::minutes(ttl_minutes)) {
        Ok(token) => println!("{}", token),
        Err(e) => {
            eprintln!("❌ Failed to sign token: {}", e);
            std::process::exit(1);
        }
    }
}
