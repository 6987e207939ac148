use std::env;
use std::process;

use domain::adapters::memory_repo::MemoryMemberRepository;
use domain::service::MemberService;
use domain::{CoreError, Member};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain join <name> [<name>...]\n\nNotes:\n  - This demo CLI uses an in-memory repository; data is not persisted across runs.\n  - Names are joined in order, so a repeated name is rejected as a duplicate.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    let svc = MemberService::new(MemoryMemberRepository::new());

    match cmd.as_str() {
        "join" => {
            let names: Vec<String> = args.collect();
            if names.is_empty() {
                return Err("missing <name> for join".into());
            }

            for name in names {
                match svc.join(Member::new(name.clone())) {
                    Ok(id) => println!("joined: {} -> {}", name, id),
                    Err(CoreError::DuplicateMember) => {
                        println!("rejected: {} ({})", name, CoreError::DuplicateMember)
                    }
                    Err(e) => return Err(format!("join failed: {}", e)),
                }
            }

            let members = svc
                .find_members()
                .map_err(|e| format!("list failed: {}", e))?;
            println!("members: {}", members.len());
            for m in members {
                let id = m.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                println!("  {}\t{}", id, m.name);
            }
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
