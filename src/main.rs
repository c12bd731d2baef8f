//! # Folio CLI
//!
//! Usage:
//!   folio input.json
//!   echo '{ ... }' | folio
//!   folio --example > document.json
//!
//! Prints a JSON summary of the laid-out pages on stdout.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print!("{}", example_document_json());
        return;
    }

    let input = if args.len() > 1 && !args[1].starts_with('-') {
        fs::read_to_string(&args[1]).unwrap_or_else(|e| {
            eprintln!("✗ Failed to read {}: {}", args[1], e);
            process::exit(1);
        })
    } else {
        let mut buf = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut buf) {
            eprintln!("✗ Failed to read stdin: {}", e);
            process::exit(1);
        }
        buf
    };

    let summaries = match folio::summarize_json(&input) {
        Ok(summaries) => summaries,
        Err(e) => {
            eprintln!("✗ {}", e);
            process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&summaries) {
        Ok(json) => {
            println!("{}", json);
            eprintln!("✓ Laid out {} pages", summaries.len());
        }
        Err(e) => {
            eprintln!("✗ Failed to serialize the page summary: {}", e);
            process::exit(1);
        }
    }
}

fn example_document_json() -> &'static str {
    r##"{
  "page": {
    "size": { "Custom": { "width": 300, "height": 400 } },
    "margin": { "top": 40, "right": 30, "bottom": 40, "left": 30 },
    "marginBoxes": [
      {
        "position": "TopLeft",
        "content": [{ "Element": "chapter" }]
      },
      {
        "position": "BottomCenter",
        "content": [{ "Text": "Page " }, { "Counter": "page" }, { "Text": " of " }, { "Counter": "pages" }]
      }
    ]
  },
  "pageRules": [
    { "first": true, "marginBoxes": [{ "position": "TopLeft", "content": [] }] }
  ],
  "root": {
    "kind": { "type": "Block" },
    "children": [
      {
        "kind": { "type": "Block" },
        "style": { "position": { "Running": "chapter" } },
        "children": [{ "kind": { "type": "Text", "content": "Chapter One" } }]
      },
      {
        "kind": { "type": "Block" },
        "style": { "anchor": "intro", "margin": { "top": { "Pt": 0 }, "right": { "Pt": 0 }, "bottom": { "Pt": 12 }, "left": { "Pt": 0 } } },
        "children": [
          { "kind": { "type": "Text", "content": "Pages are not slices of an infinite canvas. Every box knows where the page ends and where the next page picks up." } },
          {
            "kind": { "type": "FootnoteCall", "body": {
              "kind": { "type": "Block" },
              "children": [{ "kind": { "type": "Text", "content": "Footnotes grow from the page bottom." } }]
            } },
            "children": [{ "kind": { "type": "Text", "content": "1" } }]
          }
        ]
      },
      {
        "kind": { "type": "Block" },
        "style": { "float": "Right", "width": { "Pt": 80 }, "height": { "Pt": 60 } }
      },
      {
        "kind": { "type": "Block" },
        "style": { "breakBefore": "Page", "widows": 2, "orphans": 2 },
        "children": [
          { "kind": { "type": "Text", "content": "The introduction starts on page " } },
          { "kind": { "type": "Generated", "content": [{ "TargetCounter": { "anchor": "intro", "counter": "page" } }] } },
          { "kind": { "type": "Text", "content": "." } }
        ]
      }
    ]
  }
}
"##
}
