use clap::Subcommand;
use orchard_core::{ChannelBridge, Config, Database, DeepLink};

use super::{open_host, print_json, CliResult};

#[derive(Subcommand)]
pub enum ShieldAction {
    /// Re-render the shield copy for the current balance and publish it
    Publish,
    /// Show the shield copy as currently published
    Show,
    /// Leave a deep link for the app, as the shield button does
    PostLink {
        /// Link to post; defaults to an unlock link carrying the balance
        url: Option<String>,
    },
    /// Consume the pending deep link, if any
    TakeLink,
}

pub fn run(action: ShieldAction, config: &Config) -> CliResult {
    let scheme = config.shield.deep_link_scheme.as_str();
    match action {
        ShieldAction::Publish => {
            let mut host = open_host(config)?;
            for warning in host.publish_shield() {
                eprintln!("warning: {}", serde_json::to_string(&warning)?);
            }
            print_json(&host.bridge_mut().shield().current()?)
        }
        ShieldAction::Show => {
            let mut bridge = ChannelBridge::new(Database::open_shared()?);
            print_json(&bridge.shield().current()?)
        }
        ShieldAction::PostLink { url } => {
            let mut bridge = ChannelBridge::new(Database::open_shared()?);
            let url = match url {
                Some(url) => url,
                None => {
                    let balance_hint = bridge
                        .shield()
                        .current()?
                        .map(|c| c.current_balance);
                    DeepLink::Unlock { balance_hint }.to_url(scheme)?
                }
            };
            bridge.shield().post_deep_link(&url)?;
            println!("{url}");
            Ok(())
        }
        ShieldAction::TakeLink => {
            let mut bridge = ChannelBridge::new(Database::open_shared()?);
            print_json(&bridge.shield().take_pending_deep_link(scheme)?)
        }
    }
}
