//! Resources and resource templates
//!
//! Collections (`s3://*`, `iam://*`, ...) are listed as concrete resources;
//! every addressable shape is advertised as a URI template.

use crate::dispatch::AdapterRegistry;
use crate::locator::{ResourceLocator, Scheme};
use serde_json::{json, Value};

const JSON_MIME: &str = "application/json";

/// `(scheme, uriTemplate, name, description)`
const TEMPLATES: &[(Scheme, &str, &str, &str)] = &[
    (Scheme::GDrive, "gdrive://files/{fileId}", "Drive file", "Content of a Google Drive file"),
    (Scheme::GSheets, "gsheets://{spreadsheetId}", "Spreadsheet ranges", "Read with params.ranges"),
    (Scheme::S3, "s3://{bucket}", "S3 bucket", "Objects in a bucket"),
    (Scheme::S3, "s3://{bucket}/{key}", "S3 object", "Object content, base64 encoded"),
    (Scheme::DynamoDb, "dynamodb://{table}", "DynamoDB table", "Table description"),
    (
        Scheme::DynamoDb,
        "dynamodb://{table}/{keyName}/{keyValue}",
        "DynamoDB item",
        "Item by partition key",
    ),
    (Scheme::CloudWatch, "cloudwatch://{namespace}", "CloudWatch namespace", "Metrics in a namespace"),
    (
        Scheme::CloudWatch,
        "cloudwatch://{namespace}/{metricName}/{periodMinutes}",
        "CloudWatch metric",
        "Statistics over the last period",
    ),
    (Scheme::Lambda, "lambda://{functionName}", "Lambda function", "Function configuration"),
    (Scheme::Ec2, "ec2://{instanceId}", "EC2 instance", "Instance details"),
    (Scheme::Iam, "iam://{roleName}", "IAM role", "Role details"),
];

/// Collection resources for registered AWS schemes
pub fn list_resources(registry: &AdapterRegistry) -> Vec<Value> {
    registry
        .schemes()
        .into_iter()
        .filter(|scheme| !matches!(scheme, Scheme::GDrive | Scheme::GSheets))
        .map(|scheme| {
            let uri = ResourceLocator::collection(scheme).to_string();
            json!({
                "uri": uri,
                "name": format!("All {} resources", scheme),
                "mimeType": JSON_MIME,
            })
        })
        .collect()
}

pub fn list_templates(registry: &AdapterRegistry) -> Vec<Value> {
    TEMPLATES
        .iter()
        .filter(|(scheme, ..)| registry.contains(*scheme))
        .map(|(_, template, name, description)| {
            json!({
                "uriTemplate": template,
                "name": name,
                "description": description,
                "mimeType": JSON_MIME,
            })
        })
        .collect()
}

/// `resources/read` result body
pub fn contents(uri: &str, body: &Value) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": JSON_MIME,
            "text": serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()),
        }]
    })
}
