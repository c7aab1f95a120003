mod add_integration;
mod integrations;
mod login;
mod mapping_form;
mod mappings;
mod members;

pub use add_integration::AddIntegrationView;
pub use integrations::IntegrationsView;
pub use login::LoginView;
pub use mapping_form::MappingFormView;
pub use mappings::MappingsView;
pub use members::MembersView;
