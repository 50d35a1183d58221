//! Endpoint Handlers
//!
//! The fixed set of named endpoints. Each one checks the shape of its
//! arguments, builds a locator plus operation plus params, dispatches, and
//! wraps the outcome in the caller-facing envelope:
//!
//! ```json
//! {"status": "success", "data": {...}, "nextPageToken": "..."}
//! {"status": "error", "error": {"kind": "...", "message": "...", "httpStatus": 400}}
//! ```
//!
//! Endpoints are declared in [`ENDPOINTS`]; the MCP tool catalogue is
//! generated from the same table.

use crate::dispatch::{NormalizedResult, Params, Router};
use crate::error::GatewayError;
use crate::locator::{ResourceLocator, Scheme, COLLECTION_SEGMENT};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Primitive type accepted for an endpoint field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    StringList,
    /// String, number or boolean
    Scalar,
    Object,
}

impl FieldType {
    /// JSON Schema fragment for this type
    pub fn schema(self) -> Value {
        match self {
            FieldType::String => json!({"type": "string"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::StringList => json!({"type": "array", "items": {"type": "string"}, "minItems": 1}),
            FieldType::Scalar => json!({"type": ["string", "number", "boolean"]}),
            FieldType::Object => json!({"type": "object"}),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::StringList => value
                .as_array()
                .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_string)),
            FieldType::Scalar => value.is_string() || value.is_number() || value.is_boolean(),
            FieldType::Object => value.is_object(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Integer => "an integer",
            FieldType::StringList => "a non-empty list of strings",
            FieldType::Scalar => "a string, number or boolean",
            FieldType::Object => "an object",
        }
    }
}

/// One request field of an endpoint
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub description: &'static str,
}

const fn required(name: &'static str, ty: FieldType, description: &'static str) -> Field {
    Field {
        name,
        ty,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Field {
    Field {
        name,
        ty,
        required: false,
        description,
    }
}

/// Piece of the locator an endpoint builds
#[derive(Debug, Clone, Copy)]
pub enum Segment {
    Literal(&'static str),
    /// Value of the named field as exactly one segment
    Field(&'static str),
    /// Value of the named field, split on `/` into trailing segments
    Path(&'static str),
}

/// What an endpoint dispatches to
#[derive(Debug, Clone, Copy)]
pub enum Target {
    /// Fixed scheme and operation, locator built from `segments`
    Operation {
        scheme: Scheme,
        operation: &'static str,
        segments: &'static [Segment],
    },
    /// Caller supplies the locator (`uri`), optionally the operation
    AnyResource,
}

/// A named endpoint
#[derive(Debug, Clone, Copy)]
pub struct EndpointDef {
    pub name: &'static str,
    pub description: &'static str,
    pub target: Target,
    pub fields: &'static [Field],
}

impl EndpointDef {
    /// JSON Schema describing the request object
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required_fields = Vec::new();
        for field in self.fields {
            let mut schema = field.ty.schema();
            schema["description"] = json!(field.description);
            properties.insert(field.name.to_string(), schema);
            if field.required {
                required_fields.push(field.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required_fields,
        })
    }

    /// True when the endpoint never modifies remote state
    pub fn read_only(&self) -> bool {
        !matches!(
            self.target,
            Target::Operation {
                operation: "updateCell",
                ..
            }
        )
    }
}

const PAGE_TOKEN: Field = optional("pageToken", FieldType::String, "Cursor returned by a previous page");

pub const ENDPOINTS: &[EndpointDef] = &[
    EndpointDef {
        name: "gdrive_search",
        description: "Search Google Drive files using Drive query syntax",
        target: Target::Operation {
            scheme: Scheme::GDrive,
            operation: "search",
            segments: &[Segment::Literal("files")],
        },
        fields: &[
            required("query", FieldType::String, "Drive query, e.g. name contains 'report'"),
            PAGE_TOKEN,
            optional("pageSize", FieldType::Integer, "Results per page (default 10, max 100)"),
        ],
    },
    EndpointDef {
        name: "gdrive_read_file",
        description: "Read the contents of a Google Drive file",
        target: Target::Operation {
            scheme: Scheme::GDrive,
            operation: "readFile",
            segments: &[Segment::Literal("files"), Segment::Field("fileId")],
        },
        fields: &[required("fileId", FieldType::String, "Drive file id")],
    },
    EndpointDef {
        name: "gsheets_read",
        description: "Read one or more A1 ranges from a Google Sheets spreadsheet",
        target: Target::Operation {
            scheme: Scheme::GSheets,
            operation: "readRange",
            segments: &[Segment::Field("spreadsheetId")],
        },
        fields: &[
            required("spreadsheetId", FieldType::String, "Spreadsheet id"),
            required("ranges", FieldType::StringList, "A1 ranges, e.g. Sheet1!A1:B10"),
            optional("sheetId", FieldType::Integer, "Sheet used for ranges without a sheet prefix"),
        ],
    },
    EndpointDef {
        name: "gsheets_update_cell",
        description: "Write a single cell in a Google Sheets spreadsheet",
        target: Target::Operation {
            scheme: Scheme::GSheets,
            operation: "updateCell",
            segments: &[Segment::Field("fileId")],
        },
        fields: &[
            required("fileId", FieldType::String, "Spreadsheet id"),
            required("range", FieldType::String, "Cell in A1 notation, e.g. Sheet1!B2"),
            required("value", FieldType::Scalar, "Value to write"),
        ],
    },
    EndpointDef {
        name: "s3_list_buckets",
        description: "List S3 buckets",
        target: Target::Operation {
            scheme: Scheme::S3,
            operation: "listBuckets",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[PAGE_TOKEN],
    },
    EndpointDef {
        name: "s3_list_objects",
        description: "List objects in an S3 bucket",
        target: Target::Operation {
            scheme: Scheme::S3,
            operation: "listObjects",
            segments: &[Segment::Field("bucket")],
        },
        fields: &[
            required("bucket", FieldType::String, "Bucket name"),
            optional("prefix", FieldType::String, "Key prefix filter"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "s3_get_object",
        description: "Read an S3 object (content is base64 encoded)",
        target: Target::Operation {
            scheme: Scheme::S3,
            operation: "getObject",
            segments: &[Segment::Field("bucket"), Segment::Path("key")],
        },
        fields: &[
            required("bucket", FieldType::String, "Bucket name"),
            required("key", FieldType::String, "Object key"),
        ],
    },
    EndpointDef {
        name: "s3_get_object_info",
        description: "Size, content type and timestamps of an S3 object without its body",
        target: Target::Operation {
            scheme: Scheme::S3,
            operation: "getObjectInfo",
            segments: &[Segment::Field("bucket"), Segment::Path("key")],
        },
        fields: &[
            required("bucket", FieldType::String, "Bucket name"),
            required("key", FieldType::String, "Object key"),
        ],
    },
    EndpointDef {
        name: "dynamodb_list_tables",
        description: "List DynamoDB tables",
        target: Target::Operation {
            scheme: Scheme::DynamoDb,
            operation: "listTables",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[PAGE_TOKEN],
    },
    EndpointDef {
        name: "dynamodb_describe_table",
        description: "Key schema, status, throughput and size of a DynamoDB table",
        target: Target::Operation {
            scheme: Scheme::DynamoDb,
            operation: "describeTable",
            segments: &[Segment::Field("table")],
        },
        fields: &[required("table", FieldType::String, "Table name")],
    },
    EndpointDef {
        name: "dynamodb_get_item",
        description: "Get a DynamoDB item by partition key",
        target: Target::Operation {
            scheme: Scheme::DynamoDb,
            operation: "getItem",
            segments: &[Segment::Field("table"), Segment::Path("keyValue")],
        },
        fields: &[
            required("table", FieldType::String, "Table name"),
            required("keyName", FieldType::String, "Partition key attribute"),
            required("keyValue", FieldType::String, "Partition key value"),
            optional("keyType", FieldType::String, "S (default) or N"),
        ],
    },
    EndpointDef {
        name: "dynamodb_query",
        description: "Query a DynamoDB table by partition key",
        target: Target::Operation {
            scheme: Scheme::DynamoDb,
            operation: "queryTable",
            segments: &[Segment::Field("table"), Segment::Path("keyValue")],
        },
        fields: &[
            required("table", FieldType::String, "Table name"),
            required("keyName", FieldType::String, "Partition key attribute"),
            required("keyValue", FieldType::String, "Partition key value"),
            optional("keyType", FieldType::String, "S (default) or N"),
            optional("limit", FieldType::Integer, "Maximum items (default 10)"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "cloudwatch_get_metric",
        description: "Average, minimum and maximum of a CloudWatch metric over the last period",
        target: Target::Operation {
            scheme: Scheme::CloudWatch,
            operation: "getMetric",
            segments: &[
                Segment::Path("namespace"),
                Segment::Field("metricName"),
                Segment::Field("period"),
            ],
        },
        fields: &[
            required("namespace", FieldType::String, "Metric namespace, e.g. AWS/EC2"),
            required("metricName", FieldType::String, "Metric name, e.g. CPUUtilization"),
            required("period", FieldType::Integer, "Window and granularity in minutes"),
        ],
    },
    EndpointDef {
        name: "cloudwatch_list_metrics",
        description: "List the metrics of a CloudWatch namespace",
        target: Target::Operation {
            scheme: Scheme::CloudWatch,
            operation: "listMetrics",
            segments: &[Segment::Path("namespace")],
        },
        fields: &[
            required("namespace", FieldType::String, "Metric namespace, e.g. AWS/Lambda"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "cloudwatch_list_alarms",
        description: "List CloudWatch alarms",
        target: Target::Operation {
            scheme: Scheme::CloudWatch,
            operation: "listAlarms",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[PAGE_TOKEN],
    },
    EndpointDef {
        name: "cloudwatch_list_log_groups",
        description: "List CloudWatch Logs log groups",
        target: Target::Operation {
            scheme: Scheme::CloudWatch,
            operation: "listLogGroups",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[
            optional("prefix", FieldType::String, "Log group name prefix, e.g. /aws/lambda"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "cloudwatch_query_logs",
        description: "Run a CloudWatch Logs Insights query and wait for its results (at most 1000 rows)",
        target: Target::Operation {
            scheme: Scheme::CloudWatch,
            operation: "queryLogs",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[
            required("logGroupName", FieldType::String, "Log group to query"),
            required("query", FieldType::String, "Logs Insights query string"),
            optional("hours", FieldType::Integer, "Hours to look back (default 24)"),
        ],
    },
    EndpointDef {
        name: "lambda_list_functions",
        description: "List Lambda functions",
        target: Target::Operation {
            scheme: Scheme::Lambda,
            operation: "listFunctions",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[PAGE_TOKEN],
    },
    EndpointDef {
        name: "lambda_get_function",
        description: "Describe a Lambda function",
        target: Target::Operation {
            scheme: Scheme::Lambda,
            operation: "getFunction",
            segments: &[Segment::Field("functionName")],
        },
        fields: &[required("functionName", FieldType::String, "Function name")],
    },
    EndpointDef {
        name: "lambda_get_invocations",
        description: "Hourly invocation counts of a Lambda function",
        target: Target::Operation {
            scheme: Scheme::Lambda,
            operation: "getInvocations",
            segments: &[Segment::Field("functionName")],
        },
        fields: &[
            required("functionName", FieldType::String, "Function name"),
            optional("days", FieldType::Integer, "Days to look back (1 to 60, default 1)"),
        ],
    },
    EndpointDef {
        name: "ec2_list_instances",
        description: "List EC2 instances",
        target: Target::Operation {
            scheme: Scheme::Ec2,
            operation: "listInstances",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[
            optional("maxResults", FieldType::Integer, "Page size (5 to 1000)"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "ec2_get_instance",
        description: "Describe an EC2 instance",
        target: Target::Operation {
            scheme: Scheme::Ec2,
            operation: "getInstance",
            segments: &[Segment::Field("instanceId")],
        },
        fields: &[required("instanceId", FieldType::String, "Instance id")],
    },
    EndpointDef {
        name: "ec2_get_instance_status",
        description: "Status checks and scheduled events of an EC2 instance",
        target: Target::Operation {
            scheme: Scheme::Ec2,
            operation: "getInstanceStatus",
            segments: &[Segment::Field("instanceId")],
        },
        fields: &[required("instanceId", FieldType::String, "Instance id")],
    },
    EndpointDef {
        name: "iam_list_roles",
        description: "List IAM roles",
        target: Target::Operation {
            scheme: Scheme::Iam,
            operation: "listRoles",
            segments: &[Segment::Literal(COLLECTION_SEGMENT)],
        },
        fields: &[PAGE_TOKEN],
    },
    EndpointDef {
        name: "iam_get_role",
        description: "Describe an IAM role",
        target: Target::Operation {
            scheme: Scheme::Iam,
            operation: "getRole",
            segments: &[Segment::Field("roleName")],
        },
        fields: &[required("roleName", FieldType::String, "Role name")],
    },
    EndpointDef {
        name: "iam_list_attached_policies",
        description: "Managed policies attached to an IAM role",
        target: Target::Operation {
            scheme: Scheme::Iam,
            operation: "listAttachedPolicies",
            segments: &[Segment::Field("roleName")],
        },
        fields: &[
            required("roleName", FieldType::String, "Role name"),
            PAGE_TOKEN,
        ],
    },
    EndpointDef {
        name: "resource_read",
        description: "Read any resource by locator, e.g. s3://bucket/key or iam://*",
        target: Target::AnyResource,
        fields: &[
            required("uri", FieldType::String, "Resource locator scheme://segment/segment"),
            optional("operation", FieldType::String, "Operation name, defaults per locator shape"),
            optional("params", FieldType::Object, "Operation parameters"),
        ],
    },
];

pub fn find_endpoint(name: &str) -> Option<&'static EndpointDef> {
    ENDPOINTS.iter().find(|endpoint| endpoint.name == name)
}

/// Caller-facing response: HTTP status plus envelope body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: Value,
}

impl EndpointResponse {
    pub fn success(result: NormalizedResult) -> Self {
        let mut body = json!({
            "status": "success",
            "data": result.payload,
        });
        if let Some(pagination) = result.pagination {
            body["nextPageToken"] = json!(pagination.next_page_token);
        }
        Self { status: 200, body }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            status: err.status(),
            body: json!({
                "status": "error",
                "error": err.to_json(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.body["nextPageToken"].as_str()
    }
}

impl From<Result<NormalizedResult, GatewayError>> for EndpointResponse {
    fn from(outcome: Result<NormalizedResult, GatewayError>) -> Self {
        match outcome {
            Ok(result) => Self::success(result),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Validate `args` against the declared fields
pub fn validate(endpoint: &EndpointDef, args: &Value) -> Result<Params, GatewayError> {
    let args = match args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(GatewayError::invalid_parameters(format!(
                "{} expects an object of arguments",
                endpoint.name
            )))
        },
    };

    for field in endpoint.fields {
        match args.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(GatewayError::missing_field(field.name));
            },
            None | Some(Value::Null) => {},
            Some(value) if !field.ty.accepts(value) => {
                return Err(GatewayError::invalid_parameters(format!(
                    "field '{}' must be {}",
                    field.name,
                    field.ty.describe()
                )));
            },
            Some(_) => {},
        }
    }

    Ok(args)
}

fn field_text(args: &Params, name: &str) -> Result<String, GatewayError> {
    let text = match args.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(GatewayError::missing_field(name)),
    };
    if text.trim().is_empty() {
        return Err(GatewayError::invalid_parameters(format!(
            "field '{}' must not be empty",
            name
        )));
    }
    Ok(text)
}

/// Locator plus remaining params for a fixed-target endpoint
pub fn build_request(
    scheme: Scheme,
    segments: &[Segment],
    mut args: Params,
) -> Result<(ResourceLocator, Params), GatewayError> {
    let mut parts = Vec::new();
    for segment in segments {
        match segment {
            Segment::Literal(literal) => parts.push(literal.to_string()),
            Segment::Field(name) => {
                let text = field_text(&args, name)?;
                if text.contains('/') {
                    return Err(GatewayError::invalid_parameters(format!(
                        "field '{}' must not contain '/'",
                        name
                    )));
                }
                parts.push(text);
                args.remove(*name);
            },
            Segment::Path(name) => {
                let text = field_text(&args, name)?;
                parts.extend(text.split('/').map(str::to_string));
                args.remove(*name);
            },
        }
    }
    Ok((ResourceLocator::new(scheme, parts), args))
}

/// The endpoint surface over a [`Router`]
#[derive(Clone)]
pub struct Endpoints {
    router: Router,
}

impl Endpoints {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Invoke the endpoint called `name`
    pub async fn call(&self, name: &str, args: &Value) -> EndpointResponse {
        self.try_call(name, args).await.into()
    }

    async fn try_call(&self, name: &str, args: &Value) -> Result<NormalizedResult, GatewayError> {
        let endpoint = find_endpoint(name)
            .ok_or_else(|| GatewayError::invalid_parameters(format!("unknown endpoint '{}'", name)))?;
        let args = validate(endpoint, args)?;

        match endpoint.target {
            Target::Operation {
                scheme,
                operation,
                segments,
            } => {
                let (locator, params) = build_request(scheme, segments, args)?;
                self.router.dispatch(&locator, operation, &params).await
            },
            Target::AnyResource => {
                let uri = field_text(&args, "uri")?;
                let operation = args.get("operation").and_then(Value::as_str);
                let params = args
                    .get("params")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                self.read(&uri, operation, &params).await
            },
        }
    }

    /// Read any locator; the adapter picks the operation when none is given
    pub async fn read(
        &self,
        uri: &str,
        operation: Option<&str>,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        let locator = ResourceLocator::parse(uri)?;
        let operation = match operation {
            Some(op) => op,
            None => self.router.default_operation(&locator)?,
        };
        self.router.dispatch(&locator, operation, params).await
    }

    pub async fn gdrive_search(
        &self,
        query: &str,
        page_token: Option<&str>,
        page_size: Option<u32>,
    ) -> EndpointResponse {
        self.call(
            "gdrive_search",
            &json!({"query": query, "pageToken": page_token, "pageSize": page_size}),
        )
        .await
    }

    pub async fn gdrive_read_file(&self, file_id: &str) -> EndpointResponse {
        self.call("gdrive_read_file", &json!({"fileId": file_id}))
            .await
    }

    pub async fn gsheets_read(
        &self,
        spreadsheet_id: &str,
        ranges: &[&str],
        sheet_id: Option<i64>,
    ) -> EndpointResponse {
        self.call(
            "gsheets_read",
            &json!({"spreadsheetId": spreadsheet_id, "ranges": ranges, "sheetId": sheet_id}),
        )
        .await
    }

    pub async fn gsheets_update_cell(&self, file_id: &str, range: &str, value: Value) -> EndpointResponse {
        self.call(
            "gsheets_update_cell",
            &json!({"fileId": file_id, "range": range, "value": value}),
        )
        .await
    }

    /// The per-service resource read endpoint
    pub async fn read_resource(&self, uri: &str, operation: Option<&str>, params: &Params) -> EndpointResponse {
        self.read(uri, operation, params).await.into()
    }
}
