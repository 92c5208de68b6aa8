use scampack::keys::{hex_from_npub, identity_to_hex, npub_from_hex};
use scampack::publisher::PublishSummary;
use scampack::relay::{RelayUpdate, REGIONS};
use scampack::signer::KeySigner;
use scampack::{DomainPack, Error, ErrorKind, PackClient, PackDraft, RelayRecord, RelayUrl};
use std::env;
use time::format_description::well_known::Rfc3339;
use tokio::runtime::Runtime;
use zeroize::Zeroize;

#[derive(Debug, Clone)]
pub struct Command {
    cmd: &'static str,
    usage_params: &'static str,
    desc: &'static str,
}

impl Command {
    fn usage(&self, msg: String) -> Result<(), Error> {
        Err(ErrorKind::Usage(
            msg,
            format!("Usage: scampack {} {}", self.cmd, self.usage_params),
        )
        .into())
    }
}

const COMMANDS: [Command; 25] = [
    Command {
        cmd: "add_regional_relays",
        usage_params: "<region>",
        desc: "add the extra relays for a region (north-america, europe, asia)",
    },
    Command {
        cmd: "add_relay",
        usage_params: "<url> [<name>]",
        desc: "add a relay below all the others",
    },
    Command {
        cmd: "create_pack",
        usage_params: "<name> <description> <npub,npub,...> [<tag,tag,...>]",
        desc: "publish a new scammer pack (asks for your private key)",
    },
    Command {
        cmd: "delete_pack",
        usage_params: "<d>",
        desc: "ask relays to delete one of your packs (asks for your private key)",
    },
    Command {
        cmd: "disable_relay",
        usage_params: "<url>",
        desc: "stop using a relay without forgetting it",
    },
    Command {
        cmd: "enable_relay",
        usage_params: "<url>",
        desc: "start using a disabled relay again",
    },
    Command {
        cmd: "help",
        usage_params: "<command>",
        desc: "show this list",
    },
    Command {
        cmd: "hex",
        usage_params: "<npub>",
        desc: "print the hex form of a public key",
    },
    Command {
        cmd: "mute_pack",
        usage_params: "<pack id or d>",
        desc: "add every account in a pack to your mute list (asks for your private key)",
    },
    Command {
        cmd: "npub",
        usage_params: "<pubkeyhex>",
        desc: "print the npub form of a public key",
    },
    Command {
        cmd: "print_mute_list",
        usage_params: "<pubkey>",
        desc: "print the mute list of the given user",
    },
    Command {
        cmd: "print_pack",
        usage_params: "<pack id or d>",
        desc: "print one pack",
    },
    Command {
        cmd: "print_packs",
        usage_params: "[<limit>]",
        desc: "print the most recent packs",
    },
    Command {
        cmd: "print_packs_by",
        usage_params: "<pubkey>",
        desc: "print the packs published by the given user",
    },
    Command {
        cmd: "print_profile",
        usage_params: "<pubkey>",
        desc: "print the profile metadata of the given user",
    },
    Command {
        cmd: "print_relay",
        usage_params: "<url>",
        desc: "print the relay record",
    },
    Command {
        cmd: "print_relays",
        usage_params: "",
        desc: "print all the relay records",
    },
    Command {
        cmd: "recommended_relays",
        usage_params: "[<count>]",
        desc: "print the relays that have been behaving best",
    },
    Command {
        cmd: "relay_stats",
        usage_params: "",
        desc: "connect to the read relays and print connection statistics",
    },
    Command {
        cmd: "remove_relay",
        usage_params: "<url>",
        desc: "forget a relay",
    },
    Command {
        cmd: "reset_relays",
        usage_params: "",
        desc: "replace the relay list with the built-in defaults",
    },
    Command {
        cmd: "search_packs",
        usage_params: "<query>",
        desc: "print packs whose name, description or tags contain the query",
    },
    Command {
        cmd: "set_user",
        usage_params: "<pubkey | none>",
        desc: "switch to the relay list of the given user",
    },
    Command {
        cmd: "test_relays",
        usage_params: "",
        desc: "probe every enabled relay and print the response times",
    },
    Command {
        cmd: "update_pack",
        usage_params: "<d> <name> <description> <npub,npub,...> [<tag,tag,...>]",
        desc: "publish a new version of one of your packs (asks for your private key)",
    },
];

pub fn handle_command(mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let command_string = match args.next() {
        Some(s) => s,
        None => {
            help_all();
            return Ok(());
        }
    };

    let command = match COMMANDS.iter().find(|c| c.cmd == command_string) {
        None => return Err(ErrorKind::UnknownCommand(command_string).into()),
        Some(c) => c.to_owned(),
    };

    match command.cmd {
        "add_regional_relays" => add_regional_relays(command, args, client)?,
        "add_relay" => add_relay(command, args, client)?,
        "create_pack" => create_pack(command, args, rt, client)?,
        "delete_pack" => delete_pack(command, args, rt, client)?,
        "disable_relay" => set_relay_enabled(command, args, client, false)?,
        "enable_relay" => set_relay_enabled(command, args, client, true)?,
        "help" => help(command, args)?,
        "hex" => hex(command, args)?,
        "mute_pack" => mute_pack(command, args, rt, client)?,
        "npub" => npub(command, args)?,
        "print_mute_list" => print_mute_list(command, args, rt, client)?,
        "print_pack" => print_pack(command, args, rt, client)?,
        "print_packs" => print_packs(command, args, rt, client)?,
        "print_packs_by" => print_packs_by(command, args, rt, client)?,
        "print_profile" => print_profile(command, args, rt, client)?,
        "print_relay" => print_relay(command, args, client)?,
        "print_relays" => print_relays(client)?,
        "recommended_relays" => recommended_relays(command, args, client)?,
        "relay_stats" => relay_stats(rt, client)?,
        "remove_relay" => remove_relay(command, args, client)?,
        "reset_relays" => reset_relays(client)?,
        "search_packs" => search_packs(command, args, rt, client)?,
        "set_user" => set_user(command, args, client)?,
        "test_relays" => test_relays(rt, client)?,
        "update_pack" => update_pack(command, args, rt, client)?,
        other => println!("Unknown command {}", other),
    }

    Ok(())
}

pub fn help_all() {
    println!("scampack <command> [<args>]");
    for c in COMMANDS.iter() {
        println!("  {} {}", c.cmd, c.usage_params);
    }
}

pub fn help(_cmd: Command, mut args: env::Args) -> Result<(), Error> {
    if let Some(sub) = args.next() {
        for c in COMMANDS.iter() {
            if sub == c.cmd {
                println!("scampack {} {}", c.cmd, c.usage_params);
                println!("    {}", c.desc);
                return Ok(());
            }
        }
        println!("No such command {}", sub);
    } else {
        help_all();
    }
    Ok(())
}

fn relay_url_arg(cmd: &Command, args: &mut env::Args) -> Result<RelayUrl, Error> {
    match args.next() {
        Some(url) => RelayUrl::try_from_str(&url),
        None => Err(ErrorKind::Usage(
            "Missing url parameter".to_string(),
            format!("Usage: scampack {} {}", cmd.cmd, cmd.usage_params),
        )
        .into()),
    }
}

// Comma separated list, blanks dropped
fn list_arg(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_owned())
        .collect()
}

fn login() -> Result<KeySigner, Error> {
    let mut private_key = match env::var("SCAMPACK_PRIVATE_KEY") {
        Ok(key) => key,
        Err(_) => rpassword::prompt_password("Private key (hex): ")?,
    };
    if private_key.trim().is_empty() {
        return Err(ErrorKind::SigningRejected("no private key entered".to_owned()).into());
    }
    let signer = KeySigner::from_hex(private_key.trim());
    private_key.zeroize();
    signer
}

fn print_summary(summary: &PublishSummary) {
    println!(
        "Accepted by {} of {} relays",
        summary.success_count,
        summary.per_relay.len()
    );
    for r in summary.per_relay.iter() {
        match r.detail() {
            Some(detail) => println!("  {} {} ({})", r.url, r.status, detail),
            None => println!("  {} {}", r.url, r.status),
        }
    }
}

fn print_pack_line(pack: &DomainPack) {
    let when = pack
        .created_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| pack.created_at.unix_timestamp().to_string());
    println!(
        "{} \"{}\" by {} ({} accounts) {}",
        pack.id, pack.name, pack.creator.name, pack.scammer_count, when
    );
}

pub fn add_regional_relays(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let region = match args.next() {
        Some(r) => r,
        None => return cmd.usage("Missing region parameter".to_string()),
    };
    if !REGIONS.contains(&region.as_str()) {
        return cmd.usage(format!("Unknown region {}", region));
    }
    if client.manager().add_regional_relays(&region) {
        println!("Added relays for {}.", region);
    } else {
        println!("All relays for {} were already present.", region);
    }
    Ok(())
}

pub fn add_relay(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let url = relay_url_arg(&cmd, &mut args)?;
    let mut record = RelayRecord::new(url);
    if let Some(name) = args.next() {
        record.name = name;
    }
    if client.manager().add_relay(record) {
        println!("Added.");
    } else {
        println!("Relay already present.");
    }
    Ok(())
}

pub fn set_relay_enabled(
    cmd: Command,
    mut args: env::Args,
    client: &PackClient,
    enabled: bool,
) -> Result<(), Error> {
    let url = relay_url_arg(&cmd, &mut args)?;
    if client
        .manager()
        .update_relay(&url, &RelayUpdate::enabled(enabled))
    {
        println!("Saved.");
    } else {
        println!("Relay not found.");
    }
    Ok(())
}

pub fn remove_relay(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let url = relay_url_arg(&cmd, &mut args)?;
    if client.manager().remove_relay(&url) {
        println!("Removed.");
    } else {
        println!("Relay not found.");
    }
    Ok(())
}

pub fn reset_relays(client: &PackClient) -> Result<(), Error> {
    client.manager().reset_to_defaults();
    println!("Relays reset to defaults.");
    Ok(())
}

pub fn print_relay(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let url = relay_url_arg(&cmd, &mut args)?;
    if let Some(relay) = client.manager().get_relay(&url) {
        println!("{}", serde_json::to_string_pretty(&relay)?);
    } else {
        println!("Relay not found.");
    }
    Ok(())
}

pub fn print_relays(client: &PackClient) -> Result<(), Error> {
    for relay in client.manager().get_relays().iter() {
        println!("{}", serde_json::to_string(relay)?);
    }
    Ok(())
}

pub fn recommended_relays(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let count = match args.next() {
        Some(s) => match s.parse::<usize>() {
            Ok(n) => n,
            Err(_) => return cmd.usage(format!("Not a count: {}", s)),
        },
        None => client.settings().recommended_relay_count,
    };
    for relay in client.manager().get_recommended_relays(count).iter() {
        println!(
            "{} priority={} connections={} errors={}",
            relay.url, relay.priority, relay.connection_count, relay.error_count
        );
    }
    Ok(())
}

pub fn set_user(cmd: Command, mut args: env::Args, client: &PackClient) -> Result<(), Error> {
    let user = match args.next() {
        Some(s) if s == "none" => None,
        Some(s) => Some(identity_to_hex(&s)?),
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    client.manager().set_user(user);
    println!("Now using {} relays.", client.manager().get_relays().len());
    Ok(())
}

pub fn test_relays(rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let results = rt.block_on(client.manager().test_all_relays());
    let mut results: Vec<_> = results.into_iter().collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    for (url, result) in results.iter() {
        match (result.success, result.response_time_ms, &result.error) {
            (true, Some(ms), _) => println!("{} ok {}ms", url, ms),
            (_, _, Some(e)) => println!("{} {}", url, e),
            _ => println!("{} failed", url),
        }
    }
    Ok(())
}

pub fn relay_stats(rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let _ = rt.block_on(client.connect_to_relays());
    println!("{}", serde_json::to_string_pretty(&client.status())?);
    let stats = client.relay_stats();
    println!(
        "total={} enabled={} connected={} connecting={} failed={}",
        stats.total, stats.enabled, stats.connected, stats.connecting, stats.failed
    );
    Ok(())
}

pub fn print_packs(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let limit = match args.next() {
        Some(s) => match s.parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => return cmd.usage(format!("Not a limit: {}", s)),
        },
        None => None,
    };
    let mut packs = rt.block_on(client.get_all_packs(limit));
    rt.block_on(client.enrich_creators(&mut packs));
    for pack in packs.iter() {
        print_pack_line(pack);
    }
    Ok(())
}

pub fn print_pack(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let id = match args.next() {
        Some(id) => id,
        None => return cmd.usage("Missing pack id parameter".to_string()),
    };
    match rt.block_on(client.get_pack_by_id(&id)) {
        Some(mut pack) => {
            rt.block_on(client.enrich_creators(std::slice::from_mut(&mut pack)));
            println!("{}", serde_json::to_string_pretty(&pack)?);
        }
        None => println!("Pack not found."),
    }
    Ok(())
}

pub fn search_packs(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let query = match args.next() {
        Some(q) => q,
        None => return cmd.usage("Missing query parameter".to_string()),
    };
    for pack in rt.block_on(client.search_packs(&query, None)).iter() {
        print_pack_line(pack);
    }
    Ok(())
}

pub fn print_packs_by(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let pubkey = match args.next() {
        Some(pk) => pk,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    for pack in rt.block_on(client.get_packs_by_creator(&pubkey, None))?.iter() {
        print_pack_line(pack);
    }
    Ok(())
}

pub fn print_mute_list(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let pubkey = match args.next() {
        Some(pk) => pk,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    match rt.block_on(client.get_mute_list(&pubkey))? {
        Some(list) => {
            for member in list.members.iter() {
                println!("{}", npub_from_hex(member).unwrap_or_else(|_| member.clone()));
            }
        }
        None => println!("No mute list found."),
    }
    Ok(())
}

pub fn print_profile(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let pubkey = match args.next() {
        Some(pk) => pk,
        None => return cmd.usage("Missing pubkey parameter".to_string()),
    };
    match rt.block_on(client.get_profile(&pubkey))? {
        Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        None => println!("Profile not found."),
    }
    Ok(())
}

fn draft_from_args(cmd: &Command, args: &mut env::Args) -> Option<PackDraft> {
    let name = args.next()?;
    let description = args.next()?;
    let npubs = list_arg(&args.next()?);
    let tags = args.next().map(|t| list_arg(&t)).unwrap_or_default();
    tracing::debug!("{}: {} accounts, {} tags", cmd.cmd, npubs.len(), tags.len());
    Some(PackDraft {
        name,
        description,
        npubs,
        tags,
    })
}

pub fn create_pack(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let draft = match draft_from_args(&cmd, &mut args) {
        Some(d) => d,
        None => return cmd.usage("Missing parameters".to_string()),
    };
    let signer = login()?;
    let (pack, summary) = rt.block_on(client.create_pack(&signer, &draft))?;
    println!("Created pack {}", pack.id);
    print_summary(&summary);
    Ok(())
}

pub fn update_pack(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let d = match args.next() {
        Some(d) => d,
        None => return cmd.usage("Missing d parameter".to_string()),
    };
    let draft = match draft_from_args(&cmd, &mut args) {
        Some(d) => d,
        None => return cmd.usage("Missing parameters".to_string()),
    };
    let signer = login()?;
    let (pack, summary) = rt.block_on(client.update_pack(&signer, &d, &draft))?;
    println!("Updated pack {} ({} accounts)", pack.id, pack.scammer_count);
    print_summary(&summary);
    Ok(())
}

pub fn delete_pack(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let d = match args.next() {
        Some(d) => d,
        None => return cmd.usage("Missing d parameter".to_string()),
    };
    let signer = login()?;
    let summary = rt.block_on(client.delete_pack(&signer, &d))?;
    print_summary(&summary);
    Ok(())
}

pub fn mute_pack(cmd: Command, mut args: env::Args, rt: &Runtime, client: &PackClient) -> Result<(), Error> {
    let id = match args.next() {
        Some(id) => id,
        None => return cmd.usage("Missing pack id parameter".to_string()),
    };
    let pack = match rt.block_on(client.get_pack_by_id(&id)) {
        Some(p) => p,
        None => {
            println!("Pack not found.");
            return Ok(());
        }
    };
    let members = scampack::client::pack_members(std::slice::from_ref(&pack));
    let signer = login()?;
    let (list, summary) = rt.block_on(client.block_accounts(&signer, members.as_slice()))?;
    println!(
        "All {} accounts from \"{}\" are muted ({} muted in total)",
        list.count_contained(members.as_slice()),
        pack.name,
        list.members.len()
    );
    print_summary(&summary);
    Ok(())
}

pub fn npub(cmd: Command, mut args: env::Args) -> Result<(), Error> {
    match args.next() {
        Some(hex) => {
            println!("{}", npub_from_hex(&hex)?);
            Ok(())
        }
        None => cmd.usage("Missing pubkeyhex parameter".to_string()),
    }
}

pub fn hex(cmd: Command, mut args: env::Args) -> Result<(), Error> {
    match args.next() {
        Some(npub) => {
            println!("{}", hex_from_npub(&npub)?);
            Ok(())
        }
        None => cmd.usage("Missing npub parameter".to_string()),
    }
}
