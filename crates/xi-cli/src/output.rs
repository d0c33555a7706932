//! Chat vs. receipts rendering split (SPEC_FULL.md §10 item 2), grounded
//! in `deepseek-cli/src/output.rs`'s human-readable/`print_json` divide.

use xi_core::ActionReceipt;

use crate::cli::OutputFormat;

pub fn render_receipt(format: OutputFormat, force_json: bool, receipt: &ActionReceipt) {
    if force_json || format == OutputFormat::Receipts {
        print_receipt_json(receipt);
        return;
    }
    print_receipt_chat(receipt);
}

fn print_receipt_chat(receipt: &ActionReceipt) {
    let verb = if receipt.ok { "ok" } else { "refused" };
    println!("{} {} — {} (exit={})", receipt.op.as_str(), receipt.path, verb, receipt.exit_code);
    if let Some(reason) = &receipt.reason {
        println!("  reason: {reason}");
    }
}

fn print_receipt_json(receipt: &ActionReceipt) {
    match serde_json::to_string(receipt) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("[xi WARN] failed to serialize receipt: {err}"),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("[xi WARN] failed to serialize output: {err}"),
    }
}

pub fn print_line(message: impl AsRef<str>) {
    println!("{}", message.as_ref());
}
