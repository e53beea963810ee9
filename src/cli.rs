// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version, value_parser};

fn user_arg() -> Arg {
    Arg::new("user")
        .long("user")
        .required(true)
        .help("User id")
}

fn json_args(jsonl: bool) -> Vec<Arg> {
    let mut args = vec![
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    ];
    if jsonl {
        args.push(
            Arg::new("jsonl")
                .long("jsonl")
                .action(ArgAction::SetTrue)
                .conflicts_with("json")
                .help("Print one JSON object per line"),
        );
    }
    args
}

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .required(true)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn amount_arg() -> Arg {
    Arg::new("amount")
        .long("amount")
        .required(true)
        .help("Amount in asset units, e.g. 0.25")
}

fn admin_action(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(id_arg("tx", "Transaction id"))
        .arg(
            Arg::new("admin")
                .long("admin")
                .required(true)
                .help("Approving admin id"),
        )
}

pub fn build_cli() -> Command {
    Command::new("cryptovest")
        .version(crate_version!())
        .about("Crypto wallets, investment plans and automatic investing on a local ledger")
        .subcommand_required(false)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter, e.g. info or cryptovest=debug (default: RUST_LOG or info)"),
        )
        .subcommand(Command::new("init").about("Create the ledger database"))
        .subcommand(
            Command::new("wallet")
                .about("Wallets and fund movements")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List a user's wallets")
                        .arg(user_arg())
                        .args(json_args(true)),
                )
                .subcommand(
                    Command::new("deposit")
                        .about("Request a deposit; credited after admin approval")
                        .arg(user_arg())
                        .arg(Arg::new("symbol").long("symbol").required(true))
                        .arg(amount_arg())
                        .arg(Arg::new("tx-hash").long("tx-hash")),
                )
                .subcommand(
                    Command::new("withdraw")
                        .about("Request a withdrawal; debited after admin approval")
                        .arg(user_arg())
                        .arg(id_arg("wallet", "Wallet id"))
                        .arg(amount_arg())
                        .arg(
                            Arg::new("address")
                                .long("address")
                                .required(true)
                                .help("Destination address"),
                        ),
                )
                .subcommand(
                    Command::new("swap")
                        .about("Convert between assets at the stored USD prices")
                        .arg(user_arg())
                        .arg(id_arg("wallet", "Source wallet id"))
                        .arg(
                            Arg::new("to")
                                .long("to")
                                .required(true)
                                .help("Target asset symbol"),
                        )
                        .arg(amount_arg()),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Investment plans")
                .subcommand_required(true)
                .subcommand(
                    Command::new("create")
                        .about("Fund a plan from a wallet")
                        .arg(user_arg())
                        .arg(id_arg("wallet", "Funding wallet id"))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .required(true)
                                .help("short-term | semi-annual | annual | auto-invest | fixed-term | flexible-earn"),
                        )
                        .arg(amount_arg())
                        .arg(
                            Arg::new("apy")
                                .long("apy")
                                .help("Annual rate in percent; defaults to the catalog tier"),
                        )
                        .arg(
                            Arg::new("term")
                                .long("term")
                                .value_parser(value_parser!(u32))
                                .help("Lock in months, 0 for flexible; defaults to the catalog tier"),
                        ),
                )
                .subcommand(
                    Command::new("list")
                        .about("List a user's plans")
                        .arg(user_arg())
                        .args(json_args(true)),
                )
                .subcommand(
                    Command::new("withdraw")
                        .about("Settle an unlocked plan back into its wallet")
                        .arg(user_arg())
                        .arg(id_arg("plan", "Plan id")),
                )
                .subcommand(
                    Command::new("accrue")
                        .about("Bring a plan's value up to date")
                        .arg(id_arg("plan", "Plan id")),
                )
                .subcommand(
                    Command::new("mature")
                        .about("Check whether a locked plan has reached its unlock date")
                        .arg(id_arg("plan", "Plan id")),
                )
                .subcommand(
                    Command::new("catalog")
                        .about("Show the product tiers")
                        .args(json_args(false)),
                ),
        )
        .subcommand(
            Command::new("tx")
                .about("Transaction ledger")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List ledger entries, newest first")
                        .arg(Arg::new("user").long("user"))
                        .arg(Arg::new("type").long("type"))
                        .arg(Arg::new("status").long("status"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        )
                        .args(json_args(true)),
                ),
        )
        .subcommand(
            Command::new("admin")
                .about("Approve or reject pending requests")
                .subcommand_required(true)
                .subcommand(
                    Command::new("pending")
                        .about("List pending deposits and withdrawals, oldest first")
                        .arg(Arg::new("type").long("type").help("deposit | withdrawal"))
                        .args(json_args(true)),
                )
                .subcommand(admin_action("approve-deposit", "Approve a deposit and credit the wallet"))
                .subcommand(admin_action("reject-deposit", "Reject a deposit"))
                .subcommand(admin_action(
                    "approve-withdrawal",
                    "Approve a withdrawal and debit the wallet",
                ))
                .subcommand(admin_action("reject-withdrawal", "Reject a withdrawal")),
        )
        .subcommand(
            Command::new("sweep")
                .about("Automatic investment of idle funds")
                .subcommand_required(true)
                .subcommand(
                    Command::new("run")
                        .about("Run one auto-invest tick")
                        .args(json_args(false)),
                ),
        )
        .subcommand(
            Command::new("daily")
                .about("Daily accrual and maturity batch")
                .subcommand_required(true)
                .subcommand(
                    Command::new("run")
                        .about("Accrue every open plan and flag matured ones")
                        .args(json_args(false)),
                ),
        )
        .subcommand(
            Command::new("price")
                .about("USD price quotes")
                .subcommand_required(true)
                .subcommand(Command::new("fetch").about("Refresh quotes from CoinGecko"))
                .subcommand(Command::new("list").about("Show stored quotes"))
                .subcommand(
                    Command::new("get")
                        .about("Show the quote used for one asset")
                        .arg(Arg::new("symbol").long("symbol").required(true)),
                ),
        )
        .subcommand(
            Command::new("notify")
                .about("User notifications")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .arg(user_arg())
                        .arg(
                            Arg::new("unread")
                                .long("unread")
                                .action(ArgAction::SetTrue),
                        )
                        .args(json_args(true)),
                )
                .subcommand(
                    Command::new("read")
                        .about("Mark a notification as read")
                        .arg(id_arg("id", "Notification id"))
                        .arg(user_arg()),
                ),
        )
        .subcommand(
            Command::new("balance")
                .about("Portfolio summary")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .arg(user_arg())
                        .args(json_args(false)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export ledger data")
                .subcommand_required(true)
                .subcommand(export_cmd("transactions"))
                .subcommand(export_cmd("plans")),
        )
        .subcommand(
            Command::new("config")
                .about("Engine settings")
                .subcommand_required(true)
                .subcommand(Command::new("show").args(json_args(false)))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").long("key").required(true))
                        .arg(Arg::new("value").long("value").required(true)),
                ),
        )
        .subcommand(
            Command::new("doctor")
                .about("Check ledger consistency")
                .args(json_args(false)),
        )
}

fn export_cmd(name: &'static str) -> Command {
    Command::new(name)
        .arg(
            Arg::new("format")
                .long("format")
                .default_value("csv")
                .help("csv | json"),
        )
        .arg(Arg::new("out").long("out").required(true))
        .arg(Arg::new("user").long("user"))
}
