//! Canned prompts

use crate::error::GatewayError;
use serde_json::{json, Map, Value};

/// A prompt and its (required) string arguments
pub struct PromptDef {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [(&'static str, &'static str)],
    render: fn(&Map<String, Value>) -> String,
}

fn arg<'a>(args: &'a Map<String, Value>, name: &str) -> &'a str {
    args.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn aws_status(_: &Map<String, Value>) -> String {
    "Please analyze the current status of our AWS resources and services. \
     What issues or anomalies do you see?"
        .to_string()
}

fn s3_analysis(args: &Map<String, Value>) -> String {
    format!(
        "Please analyze the contents of S3 bucket '{}' and provide insights or recommendations.",
        arg(args, "bucket")
    )
}

fn ec2_monitoring(args: &Map<String, Value>) -> String {
    format!(
        "Please monitor the status and performance of EC2 instance '{}'. \
         Provide insights and recommendations.",
        arg(args, "instanceId")
    )
}

fn cost_analysis(_: &Map<String, Value>) -> String {
    "Please analyze our AWS costs and provide recommendations for optimization \
     and cost-saving opportunities."
        .to_string()
}

pub const PROMPTS: &[PromptDef] = &[
    PromptDef {
        name: "aws_status",
        description: "Check the status of AWS resources and services",
        arguments: &[],
        render: aws_status,
    },
    PromptDef {
        name: "s3_analysis",
        description: "Analyze the contents of an S3 bucket",
        arguments: &[("bucket", "Bucket name")],
        render: s3_analysis,
    },
    PromptDef {
        name: "ec2_monitoring",
        description: "Monitor an EC2 instance",
        arguments: &[("instanceId", "Instance id")],
        render: ec2_monitoring,
    },
    PromptDef {
        name: "cost_analysis",
        description: "Analyze AWS costs",
        arguments: &[],
        render: cost_analysis,
    },
];

pub fn list_prompts() -> Vec<Value> {
    PROMPTS
        .iter()
        .map(|prompt| {
            let arguments: Vec<Value> = prompt
                .arguments
                .iter()
                .map(|(name, description)| {
                    json!({"name": name, "description": description, "required": true})
                })
                .collect();
            json!({
                "name": prompt.name,
                "description": prompt.description,
                "arguments": arguments,
            })
        })
        .collect()
}

/// `prompts/get` result for `name`
pub fn get_prompt(name: &str, args: &Map<String, Value>) -> Result<Value, GatewayError> {
    let prompt = PROMPTS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| GatewayError::not_found(format!("unknown prompt '{}'", name)))?;

    for (argument, _) in prompt.arguments {
        if arg(args, argument).is_empty() {
            return Err(GatewayError::missing_field(argument));
        }
    }

    Ok(json!({
        "description": prompt.description,
        "messages": [{
            "role": "user",
            "content": {"type": "text", "text": (prompt.render)(args)},
        }],
    }))
}
