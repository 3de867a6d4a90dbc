//! 模板与资源说明知识库
//!
//! `generate_iac` 与 `explain_iac_resource` 的静态数据：按序匹配的模板规则，
//! 以及常见 Azure 资源的说明条目。

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

const REGISTRY_DOCS: &str = "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs";

// ============================================================================
// 代码生成
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub code: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// 描述匹配条件：`all` 全部出现，或 `any` 任一出现
struct Keywords {
    all: &'static [&'static str],
    any: &'static [&'static str],
}

impl Keywords {
    fn matches(&self, desc: &str) -> bool {
        if !self.all.is_empty() {
            return self.all.iter().all(|k| desc.contains(k));
        }
        self.any.iter().any(|k| desc.contains(k))
    }
}

struct TemplateRule {
    keywords: Keywords,
    terraform: Option<(&'static str, &'static str)>,
    bicep: Option<(&'static str, &'static str)>,
}

impl TemplateRule {
    fn template(&self, dialect: Dialect) -> Option<(&'static str, &'static str)> {
        match dialect {
            Dialect::Terraform => self.terraform,
            Dialect::Bicep => self.bicep,
        }
    }
}

/// 规则按顺序匹配，先命中者生效
static TEMPLATE_RULES: &[TemplateRule] = &[
    TemplateRule {
        keywords: Keywords { all: &["storage", "account"], any: &[] },
        terraform: Some((
            TF_STORAGE_ACCOUNT,
            "Generated Azure Storage Account with recommended settings. Adjust name, location and SKU as needed.",
        )),
        bicep: Some((
            BICEP_STORAGE_ACCOUNT,
            "Generated Azure Storage Account with recommended settings. Adjust the parameters as needed.",
        )),
    },
    TemplateRule {
        keywords: Keywords { all: &[], any: &["kubernetes", "aks"] },
        terraform: Some((
            TF_AKS,
            "Generated AKS cluster with a system node pool. Add user node pools for workloads.",
        )),
        bicep: Some((
            BICEP_AKS,
            "Generated AKS cluster with a system node pool. Tune node count and VM size for the workload.",
        )),
    },
    TemplateRule {
        keywords: Keywords { all: &[], any: &["virtual network", "vnet"] },
        terraform: Some((TF_VNET, "Generated Virtual Network with a default subnet. Add subnets as needed.")),
        bicep: Some((BICEP_VNET, "Generated Virtual Network with a default subnet. Add subnets as needed.")),
    },
    TemplateRule {
        keywords: Keywords { all: &[], any: &["resource group"] },
        terraform: Some((
            TF_RESOURCE_GROUP,
            "Generated Resource Group. Other resources are usually placed inside it.",
        )),
        // Bicep 部署本身就以资源组为作用域
        bicep: None,
    },
    TemplateRule {
        keywords: Keywords { all: &[], any: &["key vault"] },
        terraform: Some((
            TF_KEY_VAULT,
            "Generated Key Vault with RBAC authorization. Grant role assignments to match your access model.",
        )),
        bicep: Some((BICEP_KEY_VAULT, "Generated Key Vault with RBAC authorization enabled.")),
    },
];

const GENERIC_NOTES: &str =
    "Generated a basic resource template. Customize it for your specific requirements.";

/// 根据自然语言描述生成模板
pub fn generate(dialect: Dialect, description: &str) -> GenerateResponse {
    let desc = description.to_lowercase();

    let matched = TEMPLATE_RULES
        .iter()
        .filter(|rule| rule.keywords.matches(&desc))
        .find_map(|rule| rule.template(dialect));

    let (code, notes) = match matched {
        Some((code, notes)) => (code.to_string(), notes.to_string()),
        None => (generic_template(dialect, description), GENERIC_NOTES.to_string()),
    };

    GenerateResponse {
        code,
        language: dialect.as_str().to_string(),
        notes,
    }
}

fn generic_template(dialect: Dialect, description: &str) -> String {
    let summary = description.lines().next().unwrap_or_default().trim();
    match dialect {
        Dialect::Terraform => format!(
            r#"# {summary}

terraform {{
  required_providers {{
    azurerm = {{
      source  = "hashicorp/azurerm"
      version = "~> 3.0"
    }}
  }}
}}

provider "azurerm" {{
  features {{}}
}}

variable "location" {{
  type    = string
  default = "eastus"
}}

resource "azurerm_resource_group" "main" {{
  name     = "rg-example"
  location = var.location
}}

# Add the resources for: {summary}
"#
        ),
        Dialect::Bicep => format!(
            r#"// {summary}

@description('Location for all resources')
param location string = resourceGroup().location

@description('Name prefix for resources')
param namePrefix string = 'app'

// Add the resources for: {summary}

output location string = location
output namePrefix string = namePrefix
"#
        ),
    }
}

const TF_STORAGE_ACCOUNT: &str = r#"resource "azurerm_resource_group" "main" {
  name     = "rg-storage"
  location = "eastus"
}

resource "azurerm_storage_account" "main" {
  name                     = "stexample001"
  resource_group_name      = azurerm_resource_group.main.name
  location                 = azurerm_resource_group.main.location
  account_tier             = "Standard"
  account_replication_type = "LRS"
  account_kind             = "StorageV2"
  min_tls_version          = "TLS1_2"

  blob_properties {
    delete_retention_policy {
      days = 7
    }
  }
}

output "primary_blob_endpoint" {
  value = azurerm_storage_account.main.primary_blob_endpoint
}
"#;

const TF_AKS: &str = r#"resource "azurerm_resource_group" "main" {
  name     = "rg-aks"
  location = "eastus"
}

resource "azurerm_kubernetes_cluster" "main" {
  name                = "aks-example"
  location            = azurerm_resource_group.main.location
  resource_group_name = azurerm_resource_group.main.name
  dns_prefix          = "aksexample"

  default_node_pool {
    name       = "system"
    node_count = 3
    vm_size    = "Standard_D2s_v3"
  }

  identity {
    type = "SystemAssigned"
  }

  network_profile {
    network_plugin = "azure"
  }
}

output "kube_config" {
  value     = azurerm_kubernetes_cluster.main.kube_config_raw
  sensitive = true
}
"#;

const TF_VNET: &str = r#"resource "azurerm_resource_group" "main" {
  name     = "rg-network"
  location = "eastus"
}

resource "azurerm_virtual_network" "main" {
  name                = "vnet-example"
  location            = azurerm_resource_group.main.location
  resource_group_name = azurerm_resource_group.main.name
  address_space       = ["10.0.0.0/16"]
}

resource "azurerm_subnet" "default" {
  name                 = "snet-default"
  resource_group_name  = azurerm_resource_group.main.name
  virtual_network_name = azurerm_virtual_network.main.name
  address_prefixes     = ["10.0.1.0/24"]
}
"#;

const TF_RESOURCE_GROUP: &str = r#"variable "location" {
  type    = string
  default = "eastus"
}

resource "azurerm_resource_group" "main" {
  name     = "rg-example"
  location = var.location

  tags = {
    environment = "dev"
  }
}

output "resource_group_id" {
  value = azurerm_resource_group.main.id
}
"#;

const TF_KEY_VAULT: &str = r#"data "azurerm_client_config" "current" {}

resource "azurerm_resource_group" "main" {
  name     = "rg-keyvault"
  location = "eastus"
}

resource "azurerm_key_vault" "main" {
  name                       = "kv-example-001"
  location                   = azurerm_resource_group.main.location
  resource_group_name        = azurerm_resource_group.main.name
  tenant_id                  = data.azurerm_client_config.current.tenant_id
  sku_name                   = "standard"
  enable_rbac_authorization  = true
  purge_protection_enabled   = true
  soft_delete_retention_days = 7
}
"#;

const BICEP_STORAGE_ACCOUNT: &str = r#"@description('Storage account name')
@minLength(3)
@maxLength(24)
param storageAccountName string

param location string = resourceGroup().location

@allowed([
  'Standard_LRS'
  'Standard_GRS'
  'Standard_ZRS'
])
param skuName string = 'Standard_LRS'

resource storageAccount 'Microsoft.Storage/storageAccounts@2023-01-01' = {
  name: storageAccountName
  location: location
  sku: {
    name: skuName
  }
  kind: 'StorageV2'
  properties: {
    supportsHttpsTrafficOnly: true
    minimumTlsVersion: 'TLS1_2'
    allowBlobPublicAccess: false
  }
}

output blobEndpoint string = storageAccount.properties.primaryEndpoints.blob
"#;

const BICEP_AKS: &str = r#"param clusterName string = 'aks-example'
param location string = resourceGroup().location
param nodeCount int = 3
param vmSize string = 'Standard_D2s_v3'

resource aks 'Microsoft.ContainerService/managedClusters@2023-08-01' = {
  name: clusterName
  location: location
  identity: {
    type: 'SystemAssigned'
  }
  properties: {
    dnsPrefix: clusterName
    agentPoolProfiles: [
      {
        name: 'system'
        count: nodeCount
        vmSize: vmSize
        mode: 'System'
      }
    ]
    networkProfile: {
      networkPlugin: 'azure'
    }
  }
}

output clusterFqdn string = aks.properties.fqdn
"#;

const BICEP_VNET: &str = r#"param vnetName string = 'vnet-example'
param location string = resourceGroup().location

resource vnet 'Microsoft.Network/virtualNetworks@2023-05-01' = {
  name: vnetName
  location: location
  properties: {
    addressSpace: {
      addressPrefixes: [
        '10.0.0.0/16'
      ]
    }
    subnets: [
      {
        name: 'snet-default'
        properties: {
          addressPrefix: '10.0.1.0/24'
        }
      }
    ]
  }
}

output vnetId string = vnet.id
"#;

const BICEP_KEY_VAULT: &str = r#"param keyVaultName string
param location string = resourceGroup().location

resource keyVault 'Microsoft.KeyVault/vaults@2023-02-01' = {
  name: keyVaultName
  location: location
  properties: {
    tenantId: subscription().tenantId
    sku: {
      family: 'A'
      name: 'standard'
    }
    enableRbacAuthorization: true
    enableSoftDelete: true
    softDeleteRetentionInDays: 7
    enablePurgeProtection: true
  }
}

output vaultUri string = keyVault.properties.vaultUri
"#;

// ============================================================================
// 资源说明
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_resources: Vec<String>,
}

struct ResourceEntry {
    key: &'static str,
    explanation: &'static str,
    example: &'static str,
    documentation_url: &'static str,
    related: &'static [&'static str],
}

impl ResourceEntry {
    fn to_response(&self) -> ExplainResponse {
        ExplainResponse {
            explanation: self.explanation.to_string(),
            examples: vec![self.example.to_string()],
            documentation_url: self.documentation_url.to_string(),
            related_resources: self.related.iter().map(|r| r.to_string()).collect(),
        }
    }
}

static RESOURCES: &[ResourceEntry] = &[
    ResourceEntry {
        key: "azurerm_kubernetes_cluster",
        explanation: "azurerm_kubernetes_cluster creates an Azure Kubernetes Service (AKS) cluster.\n\n\
Key features:\n\
• Managed control plane at no cost\n\
• Azure AD integration for authentication\n\
• Multiple node pools with autoscaling\n\
• Azure CNI or kubenet networking\n\n\
Best practices:\n\
• Prefer managed identities over service principals\n\
• Spread node pools across availability zones\n\
• Enable the Azure Policy add-on for governance",
        example: TF_AKS,
        documentation_url: "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/kubernetes_cluster",
        related: &[
            "azurerm_kubernetes_cluster_node_pool",
            "azurerm_container_registry",
            "azurerm_log_analytics_workspace",
        ],
    },
    ResourceEntry {
        key: "azurerm_storage_account",
        explanation: "azurerm_storage_account creates an Azure Storage Account (blobs, files, queues, tables).\n\n\
Key settings:\n\
• account_tier: Standard or Premium\n\
• account_replication_type: LRS, GRS, ZRS, GZRS, RA-GRS, RA-GZRS\n\
• account_kind: StorageV2 is the general purpose default\n\n\
Best practices:\n\
• Enable blob soft delete\n\
• Reach the account through private endpoints\n\
• Enforce TLS 1.2 as the minimum version",
        example: TF_STORAGE_ACCOUNT,
        documentation_url: "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/storage_account",
        related: &[
            "azurerm_storage_container",
            "azurerm_storage_blob",
            "azurerm_storage_share",
            "azurerm_private_endpoint",
        ],
    },
    ResourceEntry {
        key: "azurerm_virtual_network",
        explanation: "azurerm_virtual_network creates an Azure Virtual Network (VNet), the isolated network that other resources attach to.\n\n\
Key settings:\n\
• address_space: one or more CIDR blocks\n\
• dns_servers: custom DNS, otherwise Azure-provided\n\n\
Best practices:\n\
• Leave room in the address space for growth\n\
• Segment workloads into subnets guarded by NSGs",
        example: TF_VNET,
        documentation_url: "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/virtual_network",
        related: &[
            "azurerm_subnet",
            "azurerm_network_security_group",
            "azurerm_route_table",
            "azurerm_virtual_network_peering",
        ],
    },
    ResourceEntry {
        key: "azurerm_key_vault",
        explanation: "azurerm_key_vault creates an Azure Key Vault for secrets, keys and certificates.\n\n\
Best practices:\n\
• Use RBAC authorization instead of access policies\n\
• Keep purge protection enabled in production",
        example: TF_KEY_VAULT,
        documentation_url: "https://registry.terraform.io/providers/hashicorp/azurerm/latest/docs/resources/key_vault",
        related: &["azurerm_key_vault_secret", "azurerm_key_vault_key", "azurerm_role_assignment"],
    },
    ResourceEntry {
        key: "Microsoft.Storage/storageAccounts",
        explanation: "Microsoft.Storage/storageAccounts is the Bicep/ARM type for an Azure Storage Account. Use API version 2023-01-01 or later.\n\n\
Key properties:\n\
• sku.name: Standard_LRS, Standard_GRS, Standard_ZRS, Premium_LRS\n\
• kind: StorageV2 is the general purpose default\n\
• properties.supportsHttpsTrafficOnly: keep true\n\
• properties.minimumTlsVersion: TLS1_2",
        example: BICEP_STORAGE_ACCOUNT,
        documentation_url: "https://learn.microsoft.com/azure/templates/microsoft.storage/storageaccounts",
        related: &[
            "Microsoft.Storage/storageAccounts/blobServices",
            "Microsoft.Storage/storageAccounts/fileServices",
            "Microsoft.Network/privateEndpoints",
        ],
    },
];

/// 查询资源说明：精确匹配（忽略大小写）优先，其次是包含该名称的条目
pub fn explain(resource: &str, property: Option<&str>) -> ExplainResponse {
    let wanted = resource.trim().to_lowercase();

    let entry = RESOURCES
        .iter()
        .find(|e| e.key.to_lowercase() == wanted)
        .or_else(|| RESOURCES.iter().find(|e| e.key.to_lowercase().contains(&wanted)));

    let mut response = match entry {
        Some(entry) => entry.to_response(),
        None => not_found(resource.trim()),
    };

    if let Some(property) = property.map(str::trim).filter(|p| !p.is_empty()) {
        response.explanation.push_str(&format!(
            "\n\nProperty `{property}`: see the argument reference at {} for its allowed values.",
            if response.documentation_url.is_empty() {
                REGISTRY_DOCS
            } else {
                response.documentation_url.as_str()
            }
        ));
    }

    response
}

fn not_found(resource: &str) -> ExplainResponse {
    ExplainResponse {
        explanation: format!(
            "Resource '{resource}' was not found in the local knowledge base.\n\n\
To learn more about it:\n\
1. Terraform Registry: {REGISTRY_DOCS}\n\
2. Azure template reference: https://learn.microsoft.com/azure/templates/\n\
3. `az provider show` for ARM resource types"
        ),
        examples: Vec::new(),
        documentation_url: REGISTRY_DOCS.to_string(),
        related_resources: Vec::new(),
    }
}
