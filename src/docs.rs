use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::catalog::list_tools,
        crate::api::catalog::get_tool,
        crate::api::tool::run_tool,
        crate::api::checkout::create_checkout,
        crate::api::webhooks::stripe_webhook,
        crate::api::account::get_user,
        crate::api::account::request_tool,
        crate::api::operations::list_operations,
        crate::api::operations::operation_link,
        crate::api::operations::delete_operation,
        crate::api::operations::download
    ),
    components(
        schemas(
            crate::models::Tool,
            crate::models::ToolKind,
            crate::models::ImageFit,
            crate::models::UserAccount,
            crate::models::OperationRecord,
            crate::pricing::Price,
            crate::fulfillment::FulfillmentOutcome,
            crate::api::tool::ToolRequestBody,
            crate::api::checkout::CheckoutOptions,
            crate::api::checkout::CheckoutRequest,
            crate::api::checkout::CheckoutResponse,
            crate::api::account::ToolRequestInput,
            crate::api::operations::DownloadResponse
        )
    ),
    tags(
        (name = "tools", description = "Tool catalog and tool runs"),
        (name = "payments", description = "Checkout sessions"),
        (name = "operations", description = "Stored results and download codes"),
        (name = "account", description = "Credits and tool requests"),
        (name = "webhooks", description = "Callbacks from Stripe")
    )
)]
pub struct ApiDoc;
